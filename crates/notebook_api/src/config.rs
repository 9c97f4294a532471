use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::{DEFAULT_API_PREFIX, DEFAULT_BASE_URL};

/// Transport configuration for notebook backend requests.
#[derive(Debug, Clone)]
pub struct NotebookApiConfig {
    /// Backend origin, e.g. `https://notebook.example.com`.
    pub base_url: String,
    /// Router prefix appended to `base_url` (`/api` by default).
    pub api_prefix: String,
    /// Opaque per-user identifier sent as `X-User-Id`.
    pub user_id: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout. Applies to the whole streaming body as well.
    pub timeout: Option<Duration>,
}

impl Default for NotebookApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            user_id: String::new(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl NotebookApiConfig {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_api_prefix(mut self, api_prefix: impl Into<String>) -> Self {
        self.api_prefix = api_prefix.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
