//! Fix-strategy selection and application
//!
//! For a classified install/build failure the engine picks one remediation
//! action, in this order:
//!
//! 1. a historical fix recorded for the exact error pattern, unless its
//!    strategy type was already tried in this session;
//! 2. the first untried strategy of the category's default catalog;
//! 3. the catalog's last strategy, once everything has been tried.
//!
//! Selection is pure. [`FixStrategyEngine::apply_fix`] performs the chosen
//! mutation on the project and reports failures as a [`FixOutcome`] instead
//! of an error.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ResurrectConfig;
use crate::error::{RemedyError, Result};
use crate::history::{FixHistory, FixHistoryStore};
use crate::manifest::{FsManifestAccessor, ManifestAccessor, PackageManifest, caret_range};
use crate::registry::PatternRegistry;

/// Lockfile removed by default catalogs.
pub const DEFAULT_LOCKFILE: &str = "package-lock.json";

/// Version requested when a catalog moves a package off its declared range.
const LATEST: &str = "latest";

// ─────────────────────────────────────────────────────────────────────────────
// Classified errors
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of failure categories produced by the install-log classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    DependencyNotFound,
    DependencyVersionConflict,
    PeerDependencyConflict,
    NativeModuleFailure,
    LockfileConflict,
    GitDependencyFailure,
    SyntaxError,
    TypeError,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependencyNotFound => "dependency_not_found",
            Self::DependencyVersionConflict => "dependency_version_conflict",
            Self::PeerDependencyConflict => "peer_dependency_conflict",
            Self::NativeModuleFailure => "native_module_failure",
            Self::LockfileConflict => "lockfile_conflict",
            Self::GitDependencyFailure => "git_dependency_failure",
            Self::SyntaxError => "syntax_error",
            Self::TypeError => "type_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified failure from an install or build log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedError {
    pub category: FailureCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicting_packages: Vec<String>,
    /// Lower is fixed first
    pub priority: u8,
}

impl AnalyzedError {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            package_name: None,
            version_constraint: None,
            conflicting_packages: Vec::new(),
            priority: 5,
        }
    }

    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    pub fn with_version_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = Some(constraint.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// History key: `<category>:<package or "none">`.
    pub fn error_pattern(&self) -> String {
        format!(
            "{}:{}",
            self.category,
            self.package_name.as_deref().unwrap_or("none")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Remediation action. Serialized as `{"type": "adjust_version", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixStrategy {
    #[serde(rename_all = "camelCase")]
    AdjustVersion { package: String, new_version: String },
    LegacyPeerDeps,
    RemoveLockfile { lockfile: String },
    SubstitutePackage { original: String, replacement: String },
    RemovePackage { package: String },
    AddResolution { package: String, version: String },
    ForceInstall,
}

/// Strategy type without its payload; the unit attempts are tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    AdjustVersion,
    LegacyPeerDeps,
    RemoveLockfile,
    SubstitutePackage,
    RemovePackage,
    AddResolution,
    ForceInstall,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdjustVersion => "adjust_version",
            Self::LegacyPeerDeps => "legacy_peer_deps",
            Self::RemoveLockfile => "remove_lockfile",
            Self::SubstitutePackage => "substitute_package",
            Self::RemovePackage => "remove_package",
            Self::AddResolution => "add_resolution",
            Self::ForceInstall => "force_install",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FixStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::AdjustVersion { .. } => StrategyKind::AdjustVersion,
            Self::LegacyPeerDeps => StrategyKind::LegacyPeerDeps,
            Self::RemoveLockfile { .. } => StrategyKind::RemoveLockfile,
            Self::SubstitutePackage { .. } => StrategyKind::SubstitutePackage,
            Self::RemovePackage { .. } => StrategyKind::RemovePackage,
            Self::AddResolution { .. } => StrategyKind::AddResolution,
            Self::ForceInstall => StrategyKind::ForceInstall,
        }
    }
}

/// Result of applying a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Strategies tried during one remediation session, keyed by
/// `(error pattern, strategy type)`. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct FixSession {
    attempted: HashSet<(String, StrategyKind)>,
}

impl FixSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_strategy_attempted(&mut self, error: &AnalyzedError, strategy: &FixStrategy) {
        self.attempted
            .insert((error.error_pattern(), strategy.kind()));
    }

    pub fn is_attempted(&self, error_pattern: &str, kind: StrategyKind) -> bool {
        self.attempted.contains(&(error_pattern.to_string(), kind))
    }

    pub fn reset_attempted_strategies(&mut self) {
        self.attempted.clear();
    }

    pub fn attempted_count(&self) -> usize {
        self.attempted.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

pub struct FixStrategyEngine {
    registry: Option<Arc<PatternRegistry>>,
    files: Arc<dyn ManifestAccessor>,
    npmrc_file: String,
    host_arch: String,
}

impl Default for FixStrategyEngine {
    fn default() -> Self {
        Self::from_config(&ResurrectConfig::default())
    }
}

impl FixStrategyEngine {
    pub fn from_config(config: &ResurrectConfig) -> Self {
        Self {
            registry: None,
            files: Arc::new(FsManifestAccessor),
            npmrc_file: config.npmrc_file.clone(),
            host_arch: config.host_arch.clone(),
        }
    }

    /// Let default catalogs propose registry replacements.
    pub fn with_registry(mut self, registry: Arc<PatternRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_manifest_accessor(mut self, files: Arc<dyn ManifestAccessor>) -> Self {
        self.files = files;
        self
    }

    pub fn with_host_arch(mut self, host_arch: impl Into<String>) -> Self {
        self.host_arch = host_arch.into();
        self
    }

    /// Ordered default catalog for `error`. Never empty, and never holds two
    /// strategies of the same type.
    pub fn get_alternative_strategies(&self, error: &AnalyzedError) -> Vec<FixStrategy> {
        let package = error.package_name.as_deref();
        let mut candidates = Vec::new();

        match error.category {
            FailureCategory::DependencyNotFound => {
                if let Some(package) = package {
                    candidates.extend(self.known_substitute(package));
                    candidates.push(adjust(package, LATEST));
                    candidates.push(FixStrategy::RemovePackage {
                        package: package.to_string(),
                    });
                } else {
                    candidates.push(remove_lockfile());
                }
            }
            FailureCategory::DependencyVersionConflict => {
                if let Some(package) = package {
                    candidates.push(adjust(package, LATEST));
                }
                candidates.push(FixStrategy::LegacyPeerDeps);
                candidates.push(remove_lockfile());
            }
            FailureCategory::PeerDependencyConflict => {
                candidates.push(FixStrategy::LegacyPeerDeps);
                if let Some(package) = package {
                    candidates.push(FixStrategy::AddResolution {
                        package: package.to_string(),
                        version: error
                            .version_constraint
                            .clone()
                            .unwrap_or_else(|| LATEST.to_string()),
                    });
                }
                candidates.push(FixStrategy::ForceInstall);
            }
            FailureCategory::NativeModuleFailure => {
                if let Some(package) = package {
                    candidates.extend(self.known_substitute(package));
                    candidates.push(adjust(package, LATEST));
                    candidates.push(FixStrategy::RemovePackage {
                        package: package.to_string(),
                    });
                }
                candidates.push(FixStrategy::ForceInstall);
            }
            FailureCategory::LockfileConflict => {
                candidates.push(remove_lockfile());
                candidates.push(FixStrategy::ForceInstall);
            }
            FailureCategory::GitDependencyFailure => {
                if let Some(package) = package {
                    candidates.push(adjust(package, LATEST));
                    candidates.push(FixStrategy::RemovePackage {
                        package: package.to_string(),
                    });
                }
                candidates.push(remove_lockfile());
            }
            FailureCategory::SyntaxError | FailureCategory::TypeError => {
                if let Some(package) = package {
                    let version = error.version_constraint.as_deref().unwrap_or(LATEST);
                    candidates.push(adjust(package, version));
                }
                candidates.push(FixStrategy::ForceInstall);
            }
            FailureCategory::Unknown => {
                candidates.push(remove_lockfile());
                candidates.push(FixStrategy::LegacyPeerDeps);
                candidates.push(FixStrategy::ForceInstall);
            }
        }

        let mut seen = HashSet::new();
        candidates.retain(|s| seen.insert(s.kind()));
        candidates
    }

    /// Registry replacement first, then an architecture replacement for the
    /// host platform.
    fn known_substitute(&self, package: &str) -> Option<FixStrategy> {
        let registry = self.registry.as_ref()?;
        let replacement = registry
            .lookup(package)
            .map(|entry| entry.new_name.clone())
            .or_else(|| {
                registry
                    .find_architecture_incompatible(package, &self.host_arch)
                    .and_then(|entry| entry.replacement.clone())
            })?;
        Some(FixStrategy::SubstitutePackage {
            original: package.to_string(),
            replacement,
        })
    }

    /// Pick the next strategy for `error` given an optional repository history.
    pub fn select_strategy(
        &self,
        session: &FixSession,
        error: &AnalyzedError,
        history: Option<&FixHistory>,
    ) -> FixStrategy {
        let pattern = error.error_pattern();
        let historical = history.and_then(|h| h.find(&pattern)).map(|fix| &fix.strategy);
        self.select_with(session, error, &pattern, historical)
    }

    /// Same as [`Self::select_strategy`], consulting the store's repository
    /// tier and then its global tier.
    pub fn select_strategy_from_store(
        &self,
        session: &FixSession,
        error: &AnalyzedError,
        store: &FixHistoryStore,
        repo_id: &str,
    ) -> FixStrategy {
        let pattern = error.error_pattern();
        let historical = store.find_best_fix(repo_id, &pattern);
        self.select_with(session, error, &pattern, historical)
    }

    fn select_with(
        &self,
        session: &FixSession,
        error: &AnalyzedError,
        pattern: &str,
        historical: Option<&FixStrategy>,
    ) -> FixStrategy {
        if let Some(strategy) = historical
            && !session.is_attempted(pattern, strategy.kind())
        {
            tracing::debug!(pattern, strategy = %strategy.kind(), "selected historical fix");
            return strategy.clone();
        }

        let catalog = self.get_alternative_strategies(error);
        if let Some(strategy) = catalog
            .iter()
            .find(|s| !session.is_attempted(pattern, s.kind()))
        {
            tracing::debug!(pattern, strategy = %strategy.kind(), "selected default strategy");
            return strategy.clone();
        }

        tracing::debug!(
            pattern,
            attempted = session.attempted_count(),
            "all strategies attempted, repeating last resort"
        );
        catalog.last().cloned().unwrap_or(FixStrategy::ForceInstall)
    }

    pub fn has_untried_strategies(&self, session: &FixSession, error: &AnalyzedError) -> bool {
        let pattern = error.error_pattern();
        self.get_alternative_strategies(error)
            .iter()
            .any(|s| !session.is_attempted(&pattern, s.kind()))
    }

    /// Apply `strategy` to the project. Failures are reported, never raised.
    pub async fn apply_fix(&self, project_path: &Path, strategy: &FixStrategy) -> FixOutcome {
        match self.try_apply(project_path, strategy).await {
            Ok(()) => {
                tracing::info!(
                    project = %project_path.display(),
                    strategy = %strategy.kind(),
                    "fix applied"
                );
                FixOutcome::ok()
            }
            Err(e) => {
                tracing::warn!(
                    project = %project_path.display(),
                    strategy = %strategy.kind(),
                    category = e.category().as_str(),
                    error = %e,
                    "fix not applied"
                );
                FixOutcome::failed(e.to_string())
            }
        }
    }

    async fn try_apply(&self, project_path: &Path, strategy: &FixStrategy) -> Result<()> {
        match strategy {
            FixStrategy::AdjustVersion {
                package,
                new_version,
            } => {
                let mut manifest = self.read_manifest(project_path).await?;
                require_dependency(&manifest, package)?;
                if manifest.set_version(package, &caret_range(new_version)) {
                    manifest.write(self.files.as_ref(), project_path).await?;
                }
                Ok(())
            }
            FixStrategy::LegacyPeerDeps => {
                self.append_npmrc(project_path, "legacy-peer-deps=true").await
            }
            FixStrategy::ForceInstall => self.append_npmrc(project_path, "force=true").await,
            FixStrategy::RemoveLockfile { lockfile } => {
                self.remove_lockfile(project_path, lockfile).await
            }
            FixStrategy::SubstitutePackage {
                original,
                replacement,
            } => {
                let mut manifest = self.read_manifest(project_path).await?;
                let section = require_dependency(&manifest, original)?;
                let version = self
                    .registry
                    .as_ref()
                    .and_then(|r| r.lookup(original))
                    .and_then(|entry| entry.target_version(manifest.version_of(original)?))
                    .map_or_else(|| LATEST.to_string(), caret_range);
                manifest.remove_dependency(original);
                manifest.insert_dependency(section, replacement, &version);
                manifest.write(self.files.as_ref(), project_path).await
            }
            FixStrategy::RemovePackage { package } => {
                let mut manifest = self.read_manifest(project_path).await?;
                require_dependency(&manifest, package)?;
                manifest.remove_dependency(package);
                manifest.write(self.files.as_ref(), project_path).await
            }
            FixStrategy::AddResolution { package, version } => {
                let mut manifest = self.read_manifest(project_path).await?;
                let mut changed = manifest.set_pinned("resolutions", package, version);
                changed |= manifest.set_pinned("overrides", package, version);
                if changed {
                    manifest.write(self.files.as_ref(), project_path).await?;
                }
                Ok(())
            }
        }
    }

    async fn read_manifest(&self, project_path: &Path) -> Result<PackageManifest> {
        PackageManifest::read(self.files.as_ref(), project_path).await
    }

    /// Append `directive` to the project's npm config unless already present.
    async fn append_npmrc(&self, project_path: &Path, directive: &str) -> Result<()> {
        let path = project_path.join(&self.npmrc_file);
        let mut contents = match self.files.read_text(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(RemedyError::manifest_with_source(
                    format!("failed to read {}", path.display()),
                    e,
                ));
            }
        };

        if contents.lines().any(|line| line.trim() == directive) {
            return Ok(());
        }
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(directive);
        contents.push('\n');

        self.files.write_text(&path, &contents).await.map_err(|e| {
            RemedyError::manifest_with_source(format!("failed to write {}", path.display()), e)
        })
    }

    async fn remove_lockfile(&self, project_path: &Path, lockfile: &str) -> Result<()> {
        if Path::new(lockfile).file_name() != Some(OsStr::new(lockfile)) {
            return Err(RemedyError::manifest(format!(
                "lockfile must be a file name inside the project: {lockfile}"
            )));
        }
        let path = project_path.join(lockfile);
        if !self.files.exists(&path).await {
            tracing::debug!(path = %path.display(), "lockfile already absent");
            return Ok(());
        }
        self.files.remove_file(&path).await.map_err(|e| {
            RemedyError::manifest_with_source(format!("failed to remove {}", path.display()), e)
        })
    }

    /// Record a verified success so later sessions prefer the same fix.
    pub fn record_outcome(
        &self,
        store: &mut FixHistoryStore,
        repo_id: &str,
        error: &AnalyzedError,
        strategy: &FixStrategy,
        outcome: &FixOutcome,
    ) -> bool {
        if !outcome.success {
            return false;
        }
        store.record_fix(repo_id, &error.error_pattern(), strategy.clone());
        true
    }
}

fn adjust(package: &str, version: &str) -> FixStrategy {
    FixStrategy::AdjustVersion {
        package: package.to_string(),
        new_version: version.to_string(),
    }
}

fn remove_lockfile() -> FixStrategy {
    FixStrategy::RemoveLockfile {
        lockfile: DEFAULT_LOCKFILE.to_string(),
    }
}

fn require_dependency(manifest: &PackageManifest, package: &str) -> Result<&'static str> {
    manifest
        .section_of(package)
        .ok_or_else(|| RemedyError::manifest(format!("{package} is not declared in package.json")))
}
