use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notebook_api::{NotebookApiConfig, DEFAULT_API_PREFIX};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Environment variable naming the HTTP backend JSON config file.
pub const HTTP_CONFIG_PATH_ENV_VAR: &str = "NOTEBOOK_HTTP_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read HTTP backend config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse HTTP backend config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base_url '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },

    #[error("timeout_sec must be greater than zero")]
    InvalidTimeout,
}

/// On-disk settings for the HTTP backend.
///
/// ```json
/// { "base_url": "http://localhost:8000", "api_prefix": "/api", "timeout_sec": 120 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpBackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_prefix: Option<String>,
    #[serde(default)]
    pub timeout_sec: Option<u64>,
}

impl HttpBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_prefix: None,
            timeout_sec: None,
        }
    }

    #[must_use]
    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = Some(api_prefix.into());
        self
    }

    #[must_use]
    pub fn with_timeout_sec(mut self, timeout_sec: u64) -> Self {
        self.timeout_sec = Some(timeout_sec);
        self
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBaseUrl {
            value: self.base_url.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(self.base_url.trim()).map_err(|error| invalid(&error.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        if self.timeout_sec == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }

    /// Builds transport settings for one user.
    pub fn to_api_config(&self, user_id: impl Into<String>) -> NotebookApiConfig {
        let mut config = NotebookApiConfig::new(self.base_url.trim(), user_id)
            .with_api_prefix(self.api_prefix.as_deref().unwrap_or(DEFAULT_API_PREFIX));
        if let Some(timeout_sec) = self.timeout_sec {
            config = config.with_timeout(Duration::from_secs(timeout_sec));
        }
        config
    }
}
