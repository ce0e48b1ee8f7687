//! Remediation error types
//!
//! Configuration problems (malformed registry or history documents) never
//! surface here: they are recovered locally with defaults. What remains is
//! what a caller has to decide about: missing manifests, network failures,
//! unreadable lockfiles and persistence failures.

use std::path::PathBuf;

use thiserror::Error;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// `resurrect.toml` or env misconfigured
    ConfigError,
    /// `package.json` missing, unreadable or not an object
    ManifestError,
    /// URL accessibility check or npm registry lookup failed
    NetworkError,
    /// Lockfile present but unparseable
    LockfileError,
    /// Fix-history or registry persistence failed
    PersistenceError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::ManifestError => "MANIFEST_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::LockfileError => "LOCKFILE_ERROR",
            Self::PersistenceError => "PERSISTENCE_ERROR",
        }
    }
}

/// Remediation error with category and context
#[derive(Debug, Error)]
pub enum RemedyError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("package.json not found at {}", path.display())]
    ManifestNotFound { path: PathBuf },

    #[error("manifest error: {message}")]
    Manifest {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("lockfile error: {message}")]
    Lockfile {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RemedyError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::ManifestNotFound { .. } | Self::Manifest { .. } => ErrorCategory::ManifestError,
            Self::Network { .. } => ErrorCategory::NetworkError,
            Self::Lockfile { .. } => ErrorCategory::LockfileError,
            Self::Persistence { .. } => ErrorCategory::PersistenceError,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn manifest_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ManifestNotFound { path: path.into() }
    }

    /// Create a manifest error
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            source: None,
        }
    }

    /// Create a manifest error with source
    pub fn manifest_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Manifest {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a lockfile error with source
    pub fn lockfile_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Lockfile {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a persistence error with source
    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for remediation operations
pub type Result<T> = std::result::Result<T, RemedyError>;
