//! Install-log classification
//!
//! Turns raw `npm install` / build output into [`AnalyzedError`]s ordered by
//! priority (lowest first), one per error pattern.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use crate::strategy::{AnalyzedError, FailureCategory};

const UNKNOWN_PRIORITY: u8 = 9;

/// `(category, priority, pattern)`. Named groups `pkg` and `ver` carry the
/// package name and version constraint when the log reports them.
const RULE_SPECS: &[(FailureCategory, u8, &str)] = &[
    (
        FailureCategory::LockfileConflict,
        1,
        r"EINTEGRITY|code ELOCKVERIFY|Unexpected end of JSON input while parsing|npm ci can only install packages when your package\.json and package-lock\.json",
    ),
    (
        FailureCategory::GitDependencyFailure,
        2,
        r"git dep preparation failed|ls-remote -h -t \S+|Permission denied \(publickey\)|fatal: Could not read from remote repository",
    ),
    (
        FailureCategory::DependencyNotFound,
        2,
        r"'(?P<pkg>@?[^@'\s]+)@(?P<ver>[^'\s]*)' is not in (?:the npm |this )?registry",
    ),
    (
        FailureCategory::DependencyNotFound,
        2,
        r"404 Not Found - GET https?://\S+/(?P<pkg>@?[^/\s]+)",
    ),
    (FailureCategory::DependencyNotFound, 2, r"code E404"),
    (
        FailureCategory::DependencyVersionConflict,
        3,
        r"(?m)No matching version found for (?P<pkg>@?[^@\s]+)@(?P<ver>\S+?)\.?(?:\s|$)",
    ),
    (FailureCategory::DependencyVersionConflict, 3, r"code ETARGET"),
    (
        FailureCategory::PeerDependencyConflict,
        3,
        r#"Could not resolve dependency:\s*(?:npm ERR!\s*)?peer (?P<pkg>@?[^@\s]+)@"(?P<ver>[^"]+)""#,
    ),
    (
        FailureCategory::PeerDependencyConflict,
        3,
        r"code ERESOLVE|unable to resolve dependency tree",
    ),
    (
        FailureCategory::NativeModuleFailure,
        4,
        r"Failed at the (?P<pkg>@?[^@\s]+)@(?P<ver>\S+) (?:pre|post)?install script",
    ),
    (
        FailureCategory::NativeModuleFailure,
        4,
        r"gyp ERR!|node-pre-gyp ERR!|prebuild-install (?:WARN|ERR!)",
    ),
    (FailureCategory::SyntaxError, 6, r"SyntaxError: \S"),
    (FailureCategory::TypeError, 7, r"TypeError: \S|error TS\d{4}:"),
];

struct Rule {
    category: FailureCategory,
    priority: u8,
    regex: Regex,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULE_SPECS
        .iter()
        .filter_map(|&(category, priority, pattern)| match Regex::new(pattern) {
            Ok(regex) => Some(Rule {
                category,
                priority,
                regex,
            }),
            Err(e) => {
                tracing::error!(%category, pattern, error = %e, "invalid classifier rule");
                None
            }
        })
        .collect()
});

/// Packages named around an ERESOLVE report (`Found: x@1`, `from y@2`).
static CONFLICT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?:Found: |from )(?P<pkg>@?[^@\s"]+)@"#).ok());

/// Classify an install or build log.
pub fn classify_install_output(output: &str) -> Vec<AnalyzedError> {
    let mut errors: Vec<AnalyzedError> = Vec::new();

    for rule in RULES.iter() {
        for caps in rule.regex.captures_iter(output) {
            errors.push(analyzed(rule, output, &caps));
        }
    }

    let conflicting = conflicting_packages(output);
    for error in &mut errors {
        if error.category == FailureCategory::PeerDependencyConflict {
            error.conflicting_packages = conflicting.clone();
        }
    }

    // A generic match adds nothing when the same category named a package.
    let named: HashSet<FailureCategory> = errors
        .iter()
        .filter(|e| e.package_name.is_some())
        .map(|e| e.category)
        .collect();
    errors.retain(|e| e.package_name.is_some() || !named.contains(&e.category));

    errors.sort_by_key(|e| e.priority);
    let mut seen = HashSet::new();
    errors.retain(|e| seen.insert(e.error_pattern()));

    if errors.is_empty()
        && let Some(line) = output.lines().find(|line| line.contains("ERR!"))
    {
        errors.push(
            AnalyzedError::new(FailureCategory::Unknown, line.trim())
                .with_priority(UNKNOWN_PRIORITY),
        );
    }

    tracing::debug!(errors = errors.len(), "install output classified");
    errors
}

fn analyzed(rule: &Rule, output: &str, caps: &Captures<'_>) -> AnalyzedError {
    let message = caps
        .get(0)
        .map(|m| line_around(output, m.start(), m.end()))
        .unwrap_or_default();

    let mut error = AnalyzedError::new(rule.category, message).with_priority(rule.priority);
    if let Some(pkg) = caps.name("pkg") {
        error = error.with_package(decode_package(pkg.as_str()));
    }
    if let Some(ver) = caps.name("ver").filter(|v| !v.as_str().is_empty()) {
        error = error.with_version_constraint(ver.as_str());
    }
    error
}

/// Full line(s) spanned by a match, trimmed.
fn line_around(output: &str, start: usize, end: usize) -> String {
    let line_start = output[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = output[end..].find('\n').map_or(output.len(), |i| end + i);
    output[line_start..line_end].trim().to_string()
}

/// Registry URLs encode the scope separator (`@scope%2fname`).
fn decode_package(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn conflicting_packages(output: &str) -> Vec<String> {
    let Some(re) = CONFLICT_RE.as_ref() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    re.captures_iter(output)
        .filter_map(|caps| caps.name("pkg").map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_rule_compiles() {
        assert_eq!(RULES.len(), RULE_SPECS.len());
        assert!(CONFLICT_RE.is_some());
    }

    #[test]
    fn missing_package_is_named() {
        let log = "npm ERR! code E404\n\
                   npm ERR! 404 Not Found - GET https://registry.npmjs.org/left-padd - Not found\n\
                   npm ERR! 404  'left-padd@^1.0.0' is not in this registry.\n";
        let errors = classify_install_output(log);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_pattern(), "dependency_not_found:left-padd");
        assert_eq!(errors[0].version_constraint.as_deref(), Some("^1.0.0"));
    }

    #[test]
    fn scoped_names_are_decoded() {
        let log = "npm ERR! 404 Not Found - GET https://registry.npmjs.org/@acme%2fwidget - Not found";
        let errors = classify_install_output(log);
        assert_eq!(errors[0].package_name.as_deref(), Some("@acme/widget"));
    }

    #[test]
    fn eresolve_collects_conflicting_packages() {
        let log = r#"npm ERR! code ERESOLVE
npm ERR! ERESOLVE unable to resolve dependency tree
npm ERR! Found: react@17.0.2
npm ERR! Could not resolve dependency:
npm ERR! peer react@"^16.8.0" from react-dom@16.14.0
"#;
        let errors = classify_install_output(log);
        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert_eq!(error.category, FailureCategory::PeerDependencyConflict);
        assert_eq!(error.package_name.as_deref(), Some("react"));
        assert_eq!(error.version_constraint.as_deref(), Some("^16.8.0"));
        assert_eq!(error.conflicting_packages, vec!["react", "react-dom"]);
    }

    #[test]
    fn results_are_priority_ordered() {
        let log = "src/index.ts(3,1): error TS2304: Cannot find name 'x'.\n\
                   npm ERR! Failed at the node-sass@4.14.1 postinstall script.\n\
                   gyp ERR! build error\n\
                   npm ERR! notarget No matching version found for lodash@^99.0.0.\n";
        let patterns: Vec<String> = classify_install_output(log)
            .iter()
            .map(AnalyzedError::error_pattern)
            .collect();
        assert_eq!(
            patterns,
            vec![
                "dependency_version_conflict:lodash",
                "native_module_failure:node-sass",
                "type_error:none",
            ]
        );
    }

    #[test]
    fn unrecognized_failure_is_unknown() {
        let errors = classify_install_output("npm ERR! something odd happened\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, FailureCategory::Unknown);
        assert_eq!(errors[0].message, "npm ERR! something odd happened");
        assert!(classify_install_output("added 12 packages in 3s\n").is_empty());
    }
}
