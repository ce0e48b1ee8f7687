//! Pattern registry of dead dependency sources and package replacements
//!
//! The registry is a JSON document:
//!
//! ```text
//! {
//!   "version": "1.0.0",
//!   "lastUpdated": "2024-01-01T00:00:00Z",
//!   "replacements": [ { "oldName", "newName", "versionMapping", "requiresCodeChanges", ... } ],
//!   "architectureIncompatible": [ { "packageName", "incompatibleArchitectures", "replacement", "reason" } ],
//!   "knownDeadUrls": [ "https://…" ],
//!   "deadUrlPatterns": [ { "pattern", "replacementPackage", "replacementVersion", "reason" } ]
//! }
//! ```
//!
//! Loading never fails: a missing or malformed document falls back to the
//! built-in catalog in [`defaults`]. Dead-URL patterns are evaluated in
//! declaration order and the first match wins; see [`glob`] for the
//! matching rules.

pub mod defaults;
pub mod glob;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RemedyError, Result};
use crate::source::{normalize_url, url_segments};

/// Known replacement for an abandoned package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementEntry {
    pub old_name: String,
    pub new_name: String,
    /// Version token (or `*` for the default) → target version
    pub version_mapping: BTreeMap<String, String>,
    pub requires_code_changes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_change_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_mappings: Option<BTreeMap<String, String>>,
}

impl ReplacementEntry {
    /// Target version for a current version token: exact token first, then `*`.
    pub fn target_version(&self, current: &str) -> Option<&str> {
        self.version_mapping
            .get(current.trim())
            .or_else(|| self.version_mapping.get("*"))
            .map(String::as_str)
    }
}

/// Package that cannot be installed on some platforms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureIncompatibleEntry {
    pub package_name: String,
    pub incompatible_architectures: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    pub reason: String,
}

/// Glob describing a family of dead dependency URLs.
///
/// An empty `replacement_package` means "the dependency's own name".
/// A `None` `replacement_version` means "look up latest on npm".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadUrlPattern {
    pub pattern: String,
    #[serde(default)]
    pub replacement_package: String,
    #[serde(default)]
    pub replacement_version: Option<String>,
    #[serde(default)]
    pub reason: String,
}

/// On-disk registry document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    pub version: String,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
    pub replacements: Vec<ReplacementEntry>,
    #[serde(default)]
    pub architecture_incompatible: Vec<ArchitectureIncompatibleEntry>,
    #[serde(default)]
    pub known_dead_urls: Vec<String>,
    #[serde(default)]
    pub dead_url_patterns: Vec<DeadUrlPattern>,
}

/// Read-mostly catalog, loaded once per session.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    path: PathBuf,
    doc: RegistryDocument,
}

impl PatternRegistry {
    /// Load the registry at `path`, falling back to the built-in catalog.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::info!(
                    path = %path.display(),
                    error = %e,
                    "pattern registry not readable, using built-in defaults"
                );
                return Self::with_defaults(path);
            }
        };

        match serde_json::from_str::<RegistryDocument>(&contents) {
            Ok(doc) => {
                let registry = Self::from_document(path, doc);
                tracing::debug!(
                    version = %registry.doc.version,
                    replacements = registry.doc.replacements.len(),
                    patterns = registry.doc.dead_url_patterns.len(),
                    "pattern registry loaded"
                );
                registry
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "pattern registry invalid, using built-in defaults"
                );
                Self::with_defaults(path)
            }
        }
    }

    /// Registry backed by the built-in catalog; `save()` writes to `path`.
    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: defaults::default_document(),
        }
    }

    /// Build from an already parsed document. Duplicate `oldName`s collapse
    /// with the later entry winning.
    pub fn from_document(path: impl Into<PathBuf>, doc: RegistryDocument) -> Self {
        let RegistryDocument {
            version,
            last_updated,
            replacements,
            architecture_incompatible,
            known_dead_urls,
            dead_url_patterns,
        } = doc;

        let mut registry = Self {
            path: path.into(),
            doc: RegistryDocument {
                version,
                last_updated,
                replacements: Vec::with_capacity(replacements.len()),
                architecture_incompatible,
                known_dead_urls,
                dead_url_patterns,
            },
        };
        for entry in replacements {
            registry.add(entry);
        }
        registry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.doc.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.doc.last_updated
    }

    pub fn lookup(&self, old_name: &str) -> Option<&ReplacementEntry> {
        self.doc.replacements.iter().find(|e| e.old_name == old_name)
    }

    /// Upsert by `oldName`; an existing entry keeps its position.
    pub fn add(&mut self, entry: ReplacementEntry) {
        match self
            .doc
            .replacements
            .iter_mut()
            .find(|e| e.old_name == entry.old_name)
        {
            Some(existing) => *existing = entry,
            None => self.doc.replacements.push(entry),
        }
    }

    pub fn get_all(&self) -> &[ReplacementEntry] {
        &self.doc.replacements
    }

    pub fn dead_url_patterns(&self) -> &[DeadUrlPattern] {
        &self.doc.dead_url_patterns
    }

    /// Append a pattern at the lowest priority.
    pub fn add_dead_url_pattern(&mut self, pattern: DeadUrlPattern) {
        self.doc.dead_url_patterns.push(pattern);
    }

    pub fn architecture_incompatible(&self) -> &[ArchitectureIncompatibleEntry] {
        &self.doc.architecture_incompatible
    }

    pub fn find_architecture_incompatible(
        &self,
        package_name: &str,
        arch: &str,
    ) -> Option<&ArchitectureIncompatibleEntry> {
        self.doc
            .architecture_incompatible
            .iter()
            .find(|e| e.package_name == package_name && e.incompatible_architectures.contains(arch))
    }

    /// Literal membership in `knownDeadUrls`, compared after normalization.
    pub fn is_known_dead_url(&self, url: &str) -> bool {
        let candidate = normalize_url(url);
        if candidate.is_empty() {
            return false;
        }
        self.doc
            .known_dead_urls
            .iter()
            .any(|known| normalize_url(known) == candidate)
    }

    /// First dead-URL pattern (in declaration order) matching `url`.
    pub fn matches_dead_url_pattern(&self, url: &str) -> Option<&DeadUrlPattern> {
        let candidate = normalize_url(url);
        let candidate_segments = url_segments(&candidate);
        if candidate_segments.is_empty() {
            return None;
        }

        self.doc.dead_url_patterns.iter().find(|p| {
            let pattern = normalize_url(&p.pattern);
            let pattern_segments = url_segments(&pattern);
            !pattern_segments.is_empty()
                && glob::matches_path(&pattern_segments, &candidate_segments)
        })
    }

    /// Write the catalog back to its path with a fresh `lastUpdated`.
    pub fn save(&mut self) -> Result<()> {
        self.doc.last_updated = Utc::now();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RemedyError::persistence_with_source(
                    format!("failed to create {}", parent.display()),
                    e,
                )
            })?;
        }

        let json = serde_json::to_string_pretty(&self.doc).map_err(|e| {
            RemedyError::persistence_with_source("failed to serialize pattern registry", e)
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes())
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                RemedyError::persistence_with_source(
                    format!("failed to write {}", self.path.display()),
                    e,
                )
            })?;

        tracing::debug!(path = %self.path.display(), "pattern registry saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(old: &str, new: &str) -> ReplacementEntry {
        ReplacementEntry {
            old_name: old.to_string(),
            new_name: new.to_string(),
            version_mapping: [("*".to_string(), "^1.0.0".to_string())].into_iter().collect(),
            requires_code_changes: false,
            code_change_description: None,
            import_mappings: None,
        }
    }

    fn pattern(glob: &str, package: &str) -> DeadUrlPattern {
        DeadUrlPattern {
            pattern: glob.to_string(),
            replacement_package: package.to_string(),
            replacement_version: None,
            reason: String::new(),
        }
    }

    fn empty_registry() -> PatternRegistry {
        PatternRegistry::from_document(
            "unused.json",
            RegistryDocument {
                version: "1".to_string(),
                last_updated: Utc::now(),
                replacements: Vec::new(),
                architecture_incompatible: Vec::new(),
                known_dead_urls: Vec::new(),
                dead_url_patterns: Vec::new(),
            },
        )
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let registry = PatternRegistry::load(dir.path().join("absent.json"));
        assert_eq!(registry.version(), defaults::DEFAULT_REGISTRY_VERSION);
        assert!(registry.lookup("node-sass").is_some());
    }

    #[test]
    fn invalid_shape_falls_back_to_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("registry.json");

        for body in [
            "not json",
            r#"{"replacements": []}"#,
            r#"{"version": "2", "replacements": {}}"#,
            r#"{"version": "2", "replacements": [{"oldName": "a", "newName": "b"}]}"#,
        ] {
            std::fs::write(&path, body).expect("write");
            let registry = PatternRegistry::load(&path);
            assert_eq!(registry.version(), defaults::DEFAULT_REGISTRY_VERSION, "{body}");
        }
    }

    #[test]
    fn save_then_load_round_trips_with_last_write_wins() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("registry.json");

        let mut registry = empty_registry();
        registry.path = path.clone();
        registry.add(entry("left-pad", "pad-left"));
        registry.add(entry("request", "axios"));
        registry.add(entry("left-pad", "string.prototype.padstart"));
        registry.add_dead_url_pattern(pattern("github.com/*/dead", "dead"));
        registry.save().expect("save");

        let reloaded = PatternRegistry::load(&path);
        assert_eq!(reloaded.get_all(), registry.get_all());
        assert_eq!(reloaded.get_all().len(), 2);
        assert_eq!(
            reloaded.lookup("left-pad").map(|e| e.new_name.as_str()),
            Some("string.prototype.padstart")
        );
        assert_eq!(reloaded.dead_url_patterns(), registry.dead_url_patterns());
    }

    #[test]
    fn duplicate_entries_in_document_collapse() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{
                "version": "3",
                "replacements": [
                    {"oldName": "a", "newName": "b", "versionMapping": {"*": "1"}, "requiresCodeChanges": false},
                    {"oldName": "a", "newName": "c", "versionMapping": {"*": "2"}, "requiresCodeChanges": true}
                ]
            }"#,
        )
        .expect("write");

        let registry = PatternRegistry::load(&path);
        assert_eq!(registry.version(), "3");
        assert_eq!(registry.get_all().len(), 1);
        let a = registry.lookup("a").expect("entry");
        assert_eq!(a.new_name, "c");
        assert!(a.requires_code_changes);
    }

    #[test]
    fn first_declared_pattern_wins() {
        let mut registry = empty_registry();
        registry.add_dead_url_pattern(pattern("github.com/**", "first"));
        registry.add_dead_url_pattern(pattern("github.com/user/*", "second"));

        let hit = registry
            .matches_dead_url_pattern("https://github.com/user/repo")
            .expect("match");
        assert_eq!(hit.replacement_package, "first");
    }

    #[test]
    fn pattern_matching_normalizes_candidate() {
        let mut registry = empty_registry();
        registry.add_dead_url_pattern(pattern("github.com/*/repo", "repo"));

        assert!(registry.matches_dead_url_pattern("github.com/user/repo").is_some());
        assert!(registry
            .matches_dead_url_pattern("https://github.com/user/repo?tab=readme#top")
            .is_some());
        assert!(registry
            .matches_dead_url_pattern("https://github.com/user/org/repo")
            .is_none());
        assert!(registry.matches_dead_url_pattern("").is_none());
        assert!(empty_registry()
            .matches_dead_url_pattern("https://github.com/user/repo")
            .is_none());
    }

    #[test]
    fn known_dead_urls_compare_normalized() {
        let mut registry = empty_registry();
        registry
            .doc
            .known_dead_urls
            .push("https://example.com/pkg.tgz".to_string());
        assert!(registry.is_known_dead_url("http://example.com/pkg.tgz#sha"));
        assert!(!registry.is_known_dead_url("https://example.com/other.tgz"));
    }

    #[test]
    fn version_mapping_prefers_exact_token() {
        let mut e = entry("a", "b");
        e.version_mapping.insert("^2.0.0".to_string(), "^3.0.0".to_string());
        assert_eq!(e.target_version("^2.0.0"), Some("^3.0.0"));
        assert_eq!(e.target_version("^1.0.0"), Some("^1.0.0"));
    }

    #[test]
    fn architecture_lookup() {
        let registry = PatternRegistry::with_defaults("unused.json");
        let hit = registry
            .find_architecture_incompatible("node-sass", "arm64")
            .expect("entry");
        assert_eq!(hit.replacement.as_deref(), Some("sass"));
        assert!(registry.find_architecture_incompatible("node-sass", "x64").is_none());
    }
}
