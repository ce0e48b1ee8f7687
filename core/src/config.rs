//! Configuration loading
//!
//! Loads configuration from `~/.config/resurrect/resurrect.toml` (or the
//! `RESURRECT_CONFIG` env var). Every field has a default, so a missing file
//! is not an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RemedyError, Result};

/// Root configuration for the remediation engine
#[derive(Debug, Deserialize, Clone)]
pub struct ResurrectConfig {
    /// Path to the pattern registry JSON document
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Directory holding one fix-history document per repository
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    /// npm registry base URL used for alternative lookups
    #[serde(default = "default_npm_registry_url")]
    pub npm_registry_url: String,

    /// Timeout for a single URL accessibility check
    #[serde(default = "default_url_check_timeout_secs")]
    pub url_check_timeout_secs: u64,

    /// Timeout for a single npm registry request
    #[serde(default = "default_npm_timeout_secs")]
    pub npm_timeout_secs: u64,

    /// Config file that receives install directives (`legacy-peer-deps=true`)
    #[serde(default = "default_npmrc_file")]
    pub npmrc_file: String,

    /// Platform tag checked against architecture-incompatible entries
    #[serde(default = "default_host_arch")]
    pub host_arch: String,
}

fn config_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".config").join("resurrect"))
        .unwrap_or_else(|| PathBuf::from(".resurrect"))
}

fn default_registry_path() -> PathBuf {
    config_root().join("registry.json")
}

fn default_history_dir() -> PathBuf {
    config_root().join("history")
}

fn default_npm_registry_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_url_check_timeout_secs() -> u64 {
    10
}

fn default_npm_timeout_secs() -> u64 {
    10
}

fn default_npmrc_file() -> String {
    ".npmrc".to_string()
}

fn default_host_arch() -> String {
    match std::env::consts::ARCH {
        "aarch64" => "arm64".to_string(),
        "x86_64" => "x64".to_string(),
        other => other.to_string(),
    }
}

impl Default for ResurrectConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            history_dir: default_history_dir(),
            npm_registry_url: default_npm_registry_url(),
            url_check_timeout_secs: default_url_check_timeout_secs(),
            npm_timeout_secs: default_npm_timeout_secs(),
            npmrc_file: default_npmrc_file(),
            host_arch: default_host_arch(),
        }
    }
}

impl ResurrectConfig {
    /// Environment variable overriding the config file location
    pub const ENV_CONFIG_PATH: &'static str = "RESURRECT_CONFIG";

    /// Config file name inside `~/.config/resurrect/`
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "resurrect.toml";

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "resurrect config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RemedyError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: ResurrectConfig = toml::from_str(contents)
            .map_err(|e| RemedyError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }
        config_root().join(Self::DEFAULT_CONFIG_FILENAME)
    }

    fn validate(&self) -> Result<()> {
        if self.url_check_timeout_secs == 0 || self.npm_timeout_secs == 0 {
            return Err(RemedyError::config("timeouts must be at least one second"));
        }

        if self.npm_registry_url.trim().is_empty() {
            return Err(RemedyError::config("npm_registry_url must not be empty"));
        }

        if self.url_check_timeout_secs > 60 {
            tracing::warn!(
                timeout_secs = self.url_check_timeout_secs,
                "URL check timeout is unusually long, dead-URL passes will be slow"
            );
        }

        Ok(())
    }

    pub fn url_check_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.url_check_timeout_secs)
    }

    pub fn npm_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.npm_timeout_secs)
    }
}
