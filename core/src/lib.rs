//! Dependency remediation engine for abandoned JavaScript projects
//!
//! Repairs broken dependency declarations in a project's `package.json`:
//! - a pattern registry recognizes known-dead sources and known replacements
//! - the dead-URL resolver keeps, replaces or removes URL-based dependencies,
//!   transitive ones included
//! - the fix-strategy engine picks, applies and learns remediation actions
//!   for classified install errors
//!
//! Installing packages, running builds and verifying a fix belong to the
//! caller.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod classifier;
pub mod config;
pub mod dead_url;
pub mod error;
pub mod history;
pub mod http;
pub mod lockfile;
pub mod manifest;
pub mod registry;
pub mod source;
pub mod strategy;

use std::sync::Arc;

pub use classifier::classify_install_output;
pub use config::ResurrectConfig;
pub use dead_url::{
    ApplyReport, DeadUrlAction, DeadUrlHandlingResult, DeadUrlHandlingSummary, DeadUrlResolver,
    LockfileParser, NpmLookup, ProjectContext, TransitiveDependencyNode, UrlValidation,
    UrlValidator,
};
pub use error::{ErrorCategory, RemedyError, Result};
pub use history::{FixHistory, FixHistoryStore, HistoricalFix};
pub use http::{HttpUrlValidator, NpmRegistryClient};
pub use lockfile::NpmLockfileParser;
pub use manifest::{FsManifestAccessor, ManifestAccessor, PackageManifest};
pub use registry::{
    ArchitectureIncompatibleEntry, DeadUrlPattern, PatternRegistry, RegistryDocument,
    ReplacementEntry,
};
pub use source::{DependencySource, DependencySpec, PackageNameExtractor, UrlScheme};
pub use strategy::{
    AnalyzedError, FailureCategory, FixOutcome, FixSession, FixStrategy, FixStrategyEngine,
    StrategyKind,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Production wiring: configuration, the registry and the history store,
/// plus factories for the two engines.
pub struct Resurrector {
    cfg: ResurrectConfig,
    registry: Arc<PatternRegistry>,
    history: FixHistoryStore,
}

impl Resurrector {
    /// Load configuration from the default location and open the registry.
    pub fn new() -> Result<Self> {
        Ok(Self::with_config(ResurrectConfig::load()?))
    }

    pub fn with_config(cfg: ResurrectConfig) -> Self {
        let registry = Arc::new(PatternRegistry::load(&cfg.registry_path));
        let history = FixHistoryStore::new(&cfg.history_dir);

        tracing::info!(
            version = VERSION,
            registry = %cfg.registry_path.display(),
            registry_version = registry.version(),
            history_dir = %cfg.history_dir.display(),
            "resurrect engine initialized"
        );

        Self {
            cfg,
            registry,
            history,
        }
    }

    pub fn config(&self) -> &ResurrectConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &FixHistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut FixHistoryStore {
        &mut self.history
    }

    /// Resolver backed by live HTTP clients and the npm lockfile parser.
    pub fn dead_url_resolver(&self) -> Result<DeadUrlResolver> {
        let validator = Arc::new(HttpUrlValidator::from_config(&self.cfg)?);
        let npm = Arc::new(NpmRegistryClient::from_config(&self.cfg)?);
        Ok(
            DeadUrlResolver::new(Arc::clone(&self.registry), validator, npm)
                .with_lockfile_parser(Arc::new(NpmLockfileParser::default())),
        )
    }

    pub fn strategy_engine(&self) -> FixStrategyEngine {
        FixStrategyEngine::from_config(&self.cfg).with_registry(Arc::clone(&self.registry))
    }
}
