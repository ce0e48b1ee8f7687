//! HTTP collaborators for dead-URL resolution
//!
//! Both clients carry a per-request timeout and never retry; a failed
//! request is reported once and the caller decides what to do with it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::ResurrectConfig;
use crate::dead_url::{NpmLookup, UrlValidation, UrlValidator};
use crate::error::{RemedyError, Result};
use crate::source::to_browsable_url;

const USER_AGENT: &str = concat!("resurrect/", env!("CARGO_PKG_VERSION"));

/// Abbreviated package metadata: dist-tags and versions, no READMEs.
const NPM_ABBREVIATED_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8";

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RemedyError::network_with_source("failed to build HTTP client", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// URL accessibility
// ─────────────────────────────────────────────────────────────────────────────

/// Probes a dependency source with `HEAD`, falling back to `GET` when the
/// server rejects the method.
#[derive(Debug, Clone)]
pub struct HttpUrlValidator {
    client: reqwest::Client,
}

impl HttpUrlValidator {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    pub fn from_config(config: &ResurrectConfig) -> Result<Self> {
        Self::new(config.url_check_timeout())
    }

    async fn probe(&self, url: &str) -> std::result::Result<StatusCode, reqwest::Error> {
        let status = self.client.head(url).send().await?.status();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(self.client.get(url).send().await?.status());
        }
        Ok(status)
    }
}

#[async_trait]
impl UrlValidator for HttpUrlValidator {
    async fn validate(&self, url: &str) -> Result<UrlValidation> {
        let Some(target) = to_browsable_url(url) else {
            return Ok(UrlValidation {
                url: url.to_string(),
                is_valid: false,
                status_code: None,
                error: Some("not a URL-based source".to_string()),
            });
        };

        match self.probe(&target).await {
            Ok(status) => {
                let is_valid = status.is_success() || status.is_redirection();
                tracing::debug!(url, target = %target, status = status.as_u16(), is_valid, "URL probed");
                Ok(UrlValidation {
                    url: url.to_string(),
                    is_valid,
                    status_code: Some(status.as_u16()),
                    error: (!is_valid).then(|| format!("HTTP {status}")),
                })
            }
            Err(e) if e.is_connect() => {
                tracing::debug!(url, target = %target, error = %e, "URL unreachable");
                Ok(UrlValidation {
                    url: url.to_string(),
                    is_valid: false,
                    status_code: None,
                    error: Some(e.to_string()),
                })
            }
            Err(e) => Err(RemedyError::network_with_source(
                format!("accessibility check failed for {target}"),
                e,
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// npm registry
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(rename = "dist-tags", default)]
    dist_tags: DistTags,
}

#[derive(Debug, Default, Deserialize)]
struct DistTags {
    latest: Option<String>,
}

/// Latest-version lookups against an npm-compatible registry.
#[derive(Debug, Clone)]
pub struct NpmRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
        })
    }

    pub fn from_config(config: &ResurrectConfig) -> Result<Self> {
        Self::new(config.npm_registry_url.clone(), config.npm_timeout())
    }

    /// `@scope/name` keeps its leading `@` and encodes the slash.
    fn package_url(&self, package_name: &str) -> String {
        match package_name.strip_prefix('@') {
            Some(scoped) => format!("{}/@{}", self.base_url, urlencoding::encode(scoped)),
            None => format!("{}/{}", self.base_url, urlencoding::encode(package_name)),
        }
    }
}

#[async_trait]
impl NpmLookup for NpmRegistryClient {
    async fn find_npm_alternative(&self, package_name: &str) -> Result<Option<String>> {
        let url = self.package_url(package_name);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, NPM_ABBREVIATED_ACCEPT)
            .send()
            .await
            .map_err(|e| {
                RemedyError::network_with_source(format!("npm lookup failed for {package_name}"), e)
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!(package = package_name, "not published on npm");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemedyError::network(format!(
                "npm registry returned {status} for {package_name}"
            )));
        }

        let doc: PackageDocument = response.json().await.map_err(|e| {
            RemedyError::network_with_source(
                format!("unreadable npm metadata for {package_name}"),
                e,
            )
        })?;
        tracing::debug!(package = package_name, latest = ?doc.dist_tags.latest, "npm lookup");
        Ok(doc.dist_tags.latest)
    }
}
