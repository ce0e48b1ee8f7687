//! Dependency source classification
//!
//! A `package.json` version specifier is either a registry range
//! (`^1.2.0`), a URL of some flavour (`git+ssh://…`, `github:user/repo`,
//! `https://…/archive/v1.tar.gz`) or a file reference (`file:../lib`).
//! Only URL-based specifiers can go dead, so the resolver filters on
//! [`DependencySpec::is_url_based`].

use serde::{Deserialize, Serialize};

/// Registry hosts whose tarball URLs are ordinary registry installs.
const REGISTRY_HOSTS: &[&str] = &[
    "registry.npmjs.org",
    "registry.yarnpkg.com",
    "registry.npmmirror.com",
];

/// Hosted-git shorthands understood by npm (`github:user/repo`).
const HOSTED_SHORTHANDS: &[(&str, &str)] = &[
    ("github:", "github.com"),
    ("gitlab:", "gitlab.com"),
    ("bitbucket:", "bitbucket.org"),
];

/// A single `name: versionSpec` pair from a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    pub name: String,
    pub version_spec: String,
}

/// URL flavour of a URL-based specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlScheme {
    Http,
    Https,
    Git,
    GitHttp,
    GitHttps,
    GitSsh,
    /// `github:`, `gitlab:` or `bitbucket:` shorthand; carries the host
    Hosted(&'static str),
    /// Scheme-less reference that mentions `github.com`
    GithubBare,
    Other(String),
}

/// Where a dependency is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// Semver range or dist-tag resolved against the npm registry
    Registry,
    Url(UrlScheme),
    /// `file:`/`link:` or a relative/absolute path
    File,
}

impl DependencySpec {
    pub fn new(name: impl Into<String>, version_spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_spec: version_spec.into(),
        }
    }

    pub fn is_url_based(&self) -> bool {
        is_url_spec(&self.version_spec)
    }
}

/// Classify a raw version specifier.
pub fn classify_spec(spec: &str) -> DependencySource {
    let spec = spec.trim();

    if spec.starts_with("file:")
        || spec.starts_with("link:")
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("~/")
    {
        return DependencySource::File;
    }

    for &(prefix, host) in HOSTED_SHORTHANDS {
        if spec.starts_with(prefix) {
            return DependencySource::Url(UrlScheme::Hosted(host));
        }
    }

    if let Some((scheme, _)) = spec.split_once("://") {
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => UrlScheme::Http,
            "https" => UrlScheme::Https,
            "git" => UrlScheme::Git,
            "git+http" => UrlScheme::GitHttp,
            "git+https" => UrlScheme::GitHttps,
            "git+ssh" | "ssh" => UrlScheme::GitSsh,
            other => UrlScheme::Other(other.to_string()),
        };
        return DependencySource::Url(scheme);
    }

    if spec.starts_with("git@") {
        return DependencySource::Url(UrlScheme::GitSsh);
    }

    if spec.contains("github.com") {
        return DependencySource::Url(UrlScheme::GithubBare);
    }

    DependencySource::Registry
}

/// Whether a specifier points at a network location rather than the registry.
pub fn is_url_spec(spec: &str) -> bool {
    matches!(classify_spec(spec), DependencySource::Url(_))
}

/// Reduce a URL to `host/path` form: no protocol, no credentials, no query
/// or fragment, no trailing slash. Shorthands expand to their host.
///
/// ```
/// use resurrect_core::source::normalize_url;
///
/// assert_eq!(
///     normalize_url("git+ssh://git@github.com/user/repo.git#v1.0.0"),
///     "github.com/user/repo.git"
/// );
/// assert_eq!(normalize_url("github:user/repo"), "github.com/user/repo");
/// ```
pub fn normalize_url(url: &str) -> String {
    let mut rest = url.trim();

    if let Some(end) = rest.find(['?', '#']) {
        rest = &rest[..end];
    }

    for &(prefix, host) in HOSTED_SHORTHANDS {
        if let Some(path) = rest.strip_prefix(prefix) {
            return format!("{host}/{}", path.trim_matches('/'));
        }
    }

    if let Some((_, after)) = rest.split_once("://") {
        rest = after;
    }

    // Credentials (`git@host`, `user:token@host`) precede the first '/'.
    let host_end = rest.find('/').unwrap_or(rest.len());
    if let Some(at) = rest[..host_end].rfind('@') {
        rest = &rest[at + 1..];
    }

    // scp-like `github.com:user/repo`; a numeric tail is a port instead.
    let normalized = match rest.split_once(':') {
        Some((host, path))
            if !host.contains('/') && !path.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            format!("{host}/{path}")
        }
        _ => rest.to_string(),
    };

    normalized.trim_end_matches('/').to_string()
}

/// Split a normalized URL into its non-empty `/` segments.
pub fn url_segments(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|s| !s.is_empty()).collect()
}

/// Whether a resolved URL is a plain registry tarball
/// (`https://registry.npmjs.org/pkg/-/pkg-1.0.0.tgz`).
pub fn is_registry_tarball(url: &str) -> bool {
    let normalized = normalize_url(url);
    let segments = url_segments(&normalized);
    match segments.first() {
        Some(host) => REGISTRY_HOSTS.contains(host) && segments.contains(&"-"),
        None => false,
    }
}

/// Convert any URL-based specifier into an `http(s)://` URL that can be
/// probed for accessibility. Git transports map to the repository page.
pub fn to_browsable_url(spec: &str) -> Option<String> {
    let spec = spec.trim();
    let normalized = normalize_url(spec);
    let segments = url_segments(&normalized);
    if segments.is_empty() {
        return None;
    }

    match classify_spec(spec) {
        DependencySource::Url(UrlScheme::Http) | DependencySource::Url(UrlScheme::Https) => {
            let end = spec.find('#').unwrap_or(spec.len());
            Some(spec[..end].to_string())
        }
        DependencySource::Url(_) => {
            if segments.len() >= 3 {
                let repo = segments[2].trim_end_matches(".git");
                Some(format!("https://{}/{}/{}", segments[0], segments[1], repo))
            } else {
                Some(format!("https://{normalized}"))
            }
        }
        _ => None,
    }
}

/// Derives a candidate npm package name from a dead source URL.
pub trait PackageNameExtractor: Send + Sync {
    fn extract(&self, url: &str) -> Option<String>;
}

/// Default extractor: repository name for hosted git URLs, tarball stem
/// (minus version suffix) otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlNameExtractor;

impl PackageNameExtractor for UrlNameExtractor {
    fn extract(&self, url: &str) -> Option<String> {
        extract_package_name(url)
    }
}

pub fn extract_package_name(url: &str) -> Option<String> {
    let normalized = normalize_url(url);
    let segments = url_segments(&normalized);
    let host = *segments.first()?;

    let is_hosted_git = host.ends_with("github.com")
        || host == "gitlab.com"
        || host == "bitbucket.org";

    let candidate = if is_hosted_git && segments.len() >= 3 {
        segments[2].trim_end_matches(".git").to_string()
    } else {
        let last = *segments.last()?;
        if segments.len() == 1 {
            return None;
        }
        match strip_archive_extension(last) {
            Some(stem) => strip_version_suffix(stem).to_string(),
            None => last.trim_end_matches(".git").to_string(),
        }
    };

    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

fn strip_archive_extension(segment: &str) -> Option<&str> {
    [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find_map(|&ext| segment.strip_suffix(ext))
}

/// `name-1.2.3` → `name`; leaves names without a numeric suffix alone.
fn strip_version_suffix(stem: &str) -> &str {
    match stem.rfind('-') {
        Some(idx)
            if idx > 0
                && stem[idx + 1..]
                    .trim_start_matches('v')
                    .starts_with(|c: char| c.is_ascii_digit()) =>
        {
            &stem[..idx]
        }
        _ => stem,
    }
}
