//! Built-in catalog used when no registry document is available.

use std::collections::BTreeMap;

use super::{ArchitectureIncompatibleEntry, DeadUrlPattern, RegistryDocument, ReplacementEntry};

pub const DEFAULT_REGISTRY_VERSION: &str = "1.0.0";

fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn default_document() -> RegistryDocument {
    RegistryDocument {
        version: DEFAULT_REGISTRY_VERSION.to_string(),
        last_updated: chrono::Utc::now(),
        replacements: vec![
            ReplacementEntry {
                old_name: "node-sass".to_string(),
                new_name: "sass".to_string(),
                version_mapping: mapping(&[("*", "^1.69.0")]),
                requires_code_changes: false,
                code_change_description: None,
                import_mappings: None,
            },
            ReplacementEntry {
                old_name: "request".to_string(),
                new_name: "axios".to_string(),
                version_mapping: mapping(&[("*", "^1.6.0")]),
                requires_code_changes: true,
                code_change_description: Some(
                    "request's callback API differs from axios' promise API".to_string(),
                ),
                import_mappings: Some(mapping(&[("request", "axios")])),
            },
            ReplacementEntry {
                old_name: "gulp-util".to_string(),
                new_name: "fancy-log".to_string(),
                version_mapping: mapping(&[("*", "^2.0.0")]),
                requires_code_changes: true,
                code_change_description: Some(
                    "gulp-util was split; only the logger maps onto fancy-log".to_string(),
                ),
                import_mappings: Some(mapping(&[("gulp-util", "fancy-log")])),
            },
        ],
        architecture_incompatible: vec![
            ArchitectureIncompatibleEntry {
                package_name: "node-sass".to_string(),
                incompatible_architectures: ["arm64".to_string()].into_iter().collect(),
                replacement: Some("sass".to_string()),
                reason: "no prebuilt binaries for arm64 and libsass no longer builds".to_string(),
            },
            ArchitectureIncompatibleEntry {
                package_name: "fsevents".to_string(),
                incompatible_architectures: ["linux".to_string(), "win32".to_string()]
                    .into_iter()
                    .collect(),
                replacement: None,
                reason: "macOS-only file watcher".to_string(),
            },
        ],
        known_dead_urls: Vec::new(),
        dead_url_patterns: vec![
            DeadUrlPattern {
                pattern: "github.com/substack/querystring/**".to_string(),
                replacement_package: "querystring".to_string(),
                replacement_version: Some("^0.2.1".to_string()),
                reason: "IE8 fork archive removed; upstream published to npm".to_string(),
            },
            DeadUrlPattern {
                pattern: "codeload.github.com/**".to_string(),
                replacement_package: String::new(),
                replacement_version: None,
                reason: "codeload tarball links expire with the referenced ref".to_string(),
            },
        ],
    }
}
