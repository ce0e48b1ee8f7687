//! Dead-URL resolution for URL-based dependencies
//!
//! Every URL-based dependency ends up in one of three states:
//!
//! - **kept**: the URL still serves an artifact;
//! - **replaced**: the URL is dead (or known dead) and an npm release takes
//!   its place;
//! - **removed**: the URL is dead and nothing on npm replaces it.
//!
//! The registry is consulted before the network, so known-dead sources cost
//! no request. Transitive dependencies found through the lockfile are
//! processed deepest first, then the direct dependencies.
//!
//! Counters satisfy `resolved_via_npm + removed == dead_urls_found`, and for
//! a direct-only pass `dead_urls_found + kept == total_checked`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::manifest::{FsManifestAccessor, ManifestAccessor, PackageManifest, caret_range};
use crate::registry::PatternRegistry;
use crate::source::{DependencySpec, PackageNameExtractor, UrlNameExtractor, is_url_spec};

// ─────────────────────────────────────────────────────────────────────────────
// Collaborators
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of probing a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlValidation {
    pub url: String,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// URL accessibility checker.
///
/// `Ok` with `is_valid: false` means the URL is dead; `Err` means the check
/// itself could not be performed and is propagated to the caller.
#[async_trait]
pub trait UrlValidator: Send + Sync {
    async fn validate(&self, url: &str) -> Result<UrlValidation>;
}

/// npm-alternative lookup: latest published version of `package_name`.
#[async_trait]
pub trait NpmLookup: Send + Sync {
    async fn find_npm_alternative(&self, package_name: &str) -> Result<Option<String>>;
}

/// A URL-based dependency pulled in through another dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitiveDependencyNode {
    pub name: String,
    pub resolved_url: String,
    /// Ancestor package names, root to leaf
    pub parents: Vec<String>,
    /// Distance from the direct dependencies (≥ 1)
    pub depth: usize,
}

/// Lockfile reader producing the URL-based transitive dependencies.
#[async_trait]
pub trait LockfileParser: Send + Sync {
    async fn parse(&self, project_path: &Path) -> Result<Vec<TransitiveDependencyNode>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadUrlAction {
    Kept,
    Replaced,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadUrlHandlingResult {
    pub package_name: String,
    pub dead_url: String,
    pub is_url_dead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm_alternative: Option<String>,
    /// Registry-named package taking over when it differs from `package_name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_package: Option<String>,
    pub resolved: bool,
    pub action: DeadUrlAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_chain: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

impl DeadUrlHandlingResult {
    fn kept(package_name: &str, url: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            dead_url: url.to_string(),
            is_url_dead: false,
            npm_alternative: None,
            replacement_package: None,
            resolved: true,
            action: DeadUrlAction::Kept,
            warning: None,
            parent_chain: None,
            depth: None,
        }
    }

    fn replaced(package_name: &str, url: &str, version: String) -> Self {
        Self {
            is_url_dead: true,
            npm_alternative: Some(version),
            action: DeadUrlAction::Replaced,
            ..Self::kept(package_name, url)
        }
    }

    fn removed(package_name: &str, url: &str, warning: String) -> Self {
        Self {
            is_url_dead: true,
            resolved: false,
            action: DeadUrlAction::Removed,
            warning: Some(warning),
            ..Self::kept(package_name, url)
        }
    }

    /// Name the manifest should carry after this result is applied.
    pub fn target_package(&self) -> &str {
        self.replacement_package
            .as_deref()
            .unwrap_or(&self.package_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadUrlHandlingSummary {
    pub total_checked: usize,
    pub dead_urls_found: usize,
    pub resolved_via_npm: usize,
    pub removed: usize,
    pub results: Vec<DeadUrlHandlingResult>,
}

impl DeadUrlHandlingSummary {
    fn tally(&mut self, result: &DeadUrlHandlingResult) {
        self.total_checked += 1;
        match result.action {
            DeadUrlAction::Kept => {}
            DeadUrlAction::Replaced => {
                self.dead_urls_found += 1;
                self.resolved_via_npm += 1;
            }
            DeadUrlAction::Removed => {
                self.dead_urls_found += 1;
                self.removed += 1;
            }
        }
    }

    pub fn kept_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.action == DeadUrlAction::Kept)
            .count()
    }
}

/// What the resolver needs to know about the project being remediated.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    pub project_path: PathBuf,
}

impl ProjectContext {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
        }
    }
}

/// Outcome of writing results back into `package.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Non-kept transitive results, and those naming no direct dependency
    pub skipped: Vec<String>,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.removed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// No lockfile collaborator configured: no transitive nodes.
struct NoLockfile;

#[async_trait]
impl LockfileParser for NoLockfile {
    async fn parse(&self, _project_path: &Path) -> Result<Vec<TransitiveDependencyNode>> {
        Ok(Vec::new())
    }
}

pub struct DeadUrlResolver {
    registry: Arc<PatternRegistry>,
    validator: Arc<dyn UrlValidator>,
    npm: Arc<dyn NpmLookup>,
    extractor: Arc<dyn PackageNameExtractor>,
    lockfile: Arc<dyn LockfileParser>,
    files: Arc<dyn ManifestAccessor>,
}

impl DeadUrlResolver {
    pub fn new(
        registry: Arc<PatternRegistry>,
        validator: Arc<dyn UrlValidator>,
        npm: Arc<dyn NpmLookup>,
    ) -> Self {
        Self {
            registry,
            validator,
            npm,
            extractor: Arc::new(UrlNameExtractor),
            lockfile: Arc::new(NoLockfile),
            files: Arc::new(FsManifestAccessor),
        }
    }

    pub fn with_lockfile_parser(mut self, lockfile: Arc<dyn LockfileParser>) -> Self {
        self.lockfile = lockfile;
        self
    }

    pub fn with_name_extractor(mut self, extractor: Arc<dyn PackageNameExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_manifest_accessor(mut self, files: Arc<dyn ManifestAccessor>) -> Self {
        self.files = files;
        self
    }

    /// Classify the URL-based direct dependencies.
    pub async fn handle_dead_urls(
        &self,
        project: &ProjectContext,
        direct_dependencies: &[DependencySpec],
    ) -> Result<DeadUrlHandlingSummary> {
        let mut summary = DeadUrlHandlingSummary::default();

        for dep in direct_dependencies.iter().filter(|d| d.is_url_based()) {
            let result = self.classify(&dep.name, &dep.version_spec).await?;
            summary.tally(&result);
            summary.results.push(result);
        }

        tracing::info!(
            project = %project.project_path.display(),
            total_checked = summary.total_checked,
            dead_urls_found = summary.dead_urls_found,
            resolved_via_npm = summary.resolved_via_npm,
            removed = summary.removed,
            "dead-URL pass complete"
        );
        Ok(summary)
    }

    /// Classify transitive URL dependencies (deepest first), then the
    /// direct ones. Accessible transitive nodes are counted but not listed.
    pub async fn handle_dead_urls_with_transitive(
        &self,
        project: &ProjectContext,
        direct_dependencies: &[DependencySpec],
    ) -> Result<DeadUrlHandlingSummary> {
        let mut nodes = self.lockfile.parse(&project.project_path).await?;
        nodes.retain(|n| is_url_spec(&n.resolved_url));
        // Stable: same-depth nodes keep lockfile order.
        nodes.sort_by_key(|n| std::cmp::Reverse(n.depth));

        let mut summary = DeadUrlHandlingSummary::default();

        for node in &nodes {
            let mut result = self.classify(&node.name, &node.resolved_url).await?;
            summary.tally(&result);
            if result.action == DeadUrlAction::Kept {
                continue;
            }
            tracing::debug!(
                package = %node.name,
                depth = node.depth,
                parents = ?node.parents,
                action = ?result.action,
                "transitive dead URL"
            );
            result.parent_chain = Some(node.parents.clone());
            result.depth = Some(node.depth);
            summary.results.push(result);
        }

        for dep in direct_dependencies.iter().filter(|d| d.is_url_based()) {
            let result = self.classify(&dep.name, &dep.version_spec).await?;
            summary.tally(&result);
            summary.results.push(result);
        }

        tracing::info!(
            project = %project.project_path.display(),
            transitive_nodes = nodes.len(),
            total_checked = summary.total_checked,
            dead_urls_found = summary.dead_urls_found,
            resolved_via_npm = summary.resolved_via_npm,
            removed = summary.removed,
            "dead-URL pass with transitive dependencies complete"
        );
        Ok(summary)
    }

    async fn classify(&self, package_name: &str, url: &str) -> Result<DeadUrlHandlingResult> {
        if let Some(pattern) = self.registry.matches_dead_url_pattern(url) {
            let replacement = if pattern.replacement_package.is_empty() {
                package_name
            } else {
                pattern.replacement_package.as_str()
            };

            let version = match &pattern.replacement_version {
                Some(version) => Some(version.clone()),
                None => self.npm.find_npm_alternative(replacement).await?,
            };

            tracing::debug!(
                package = %package_name,
                pattern = %pattern.pattern,
                replacement = %replacement,
                "dead URL matched registry pattern"
            );

            let mut result = match version {
                Some(version) => DeadUrlHandlingResult::replaced(package_name, url, version),
                None => DeadUrlHandlingResult::removed(
                    package_name,
                    url,
                    format!(
                        "{url} matches dead pattern {} but {replacement} has no npm release",
                        pattern.pattern
                    ),
                ),
            };
            if result.action == DeadUrlAction::Replaced && replacement != package_name {
                result.replacement_package = Some(replacement.to_string());
            }
            return Ok(result);
        }

        if !self.registry.is_known_dead_url(url) {
            let validation = self.validator.validate(url).await?;
            if validation.is_valid {
                return Ok(DeadUrlHandlingResult::kept(package_name, url));
            }
            tracing::debug!(
                package = %package_name,
                url = %url,
                status = ?validation.status_code,
                error = ?validation.error,
                "dependency URL is not accessible"
            );
        }

        let candidate = self
            .extractor
            .extract(url)
            .unwrap_or_else(|| package_name.to_string());

        let mut found = self
            .npm
            .find_npm_alternative(&candidate)
            .await?
            .map(|version| (candidate.as_str(), version));
        // Forks and renamed repositories: the manifest key may still be published.
        if found.is_none() && candidate != package_name {
            found = self
                .npm
                .find_npm_alternative(package_name)
                .await?
                .map(|version| (package_name, version));
        }

        match found {
            Some((name, version)) => {
                let mut result = DeadUrlHandlingResult::replaced(package_name, url, version);
                if name != package_name {
                    result.replacement_package = Some(name.to_string());
                }
                Ok(result)
            }
            None => {
                tracing::warn!(package = %package_name, url = %url, "dead URL with no npm alternative");
                Ok(DeadUrlHandlingResult::removed(
                    package_name,
                    url,
                    format!("{url} is not accessible and no npm package named {candidate} exists; dependency removed"),
                ))
            }
        }
    }

    /// Write non-kept results into `<project>/package.json`. The file is
    /// only rewritten when something changed.
    pub async fn apply_to_package_json(
        &self,
        project_path: &Path,
        results: &[DeadUrlHandlingResult],
    ) -> Result<ApplyReport> {
        let mut manifest = PackageManifest::read(self.files.as_ref(), project_path).await?;
        let mut report = ApplyReport::default();

        for result in results.iter().filter(|r| r.action != DeadUrlAction::Kept) {
            // Lockfile nodes are not manifest entries, even when a direct
            // dependency shares the name.
            if result.depth.is_some() {
                report.skipped.push(result.package_name.clone());
                continue;
            }
            let Some(section) = manifest.section_of(&result.package_name) else {
                report.skipped.push(result.package_name.clone());
                continue;
            };

            match (&result.action, &result.npm_alternative) {
                (DeadUrlAction::Replaced, Some(version)) => {
                    let range = caret_range(version);
                    let target = result.target_package();
                    if target == result.package_name {
                        manifest.set_version(&result.package_name, &range);
                    } else {
                        manifest.remove_dependency(&result.package_name);
                        manifest.insert_dependency(section, target, &range);
                    }
                    report.updated.push(target.to_string());
                }
                _ => {
                    manifest.remove_dependency(&result.package_name);
                    report.removed.push(result.package_name.clone());
                }
            }
        }

        if report.changed() {
            manifest.write(self.files.as_ref(), project_path).await?;
            tracing::info!(
                updated = ?report.updated,
                removed = ?report.removed,
                "package.json updated"
            );
        }
        Ok(report)
    }
}
