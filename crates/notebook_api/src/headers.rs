use std::collections::BTreeMap;

use crate::config::NotebookApiConfig;
use crate::error::NotebookApiError;

pub const HEADER_USER_ID: &str = "X-User-Id";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "User-Agent";

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";

/// Build a deterministic header map for notebook requests.
pub fn build_headers(
    config: &NotebookApiConfig,
    accept: &str,
) -> Result<BTreeMap<String, String>, NotebookApiError> {
    let user_id = config.user_id.trim();
    if user_id.is_empty() {
        return Err(NotebookApiError::MissingUserId);
    }

    let mut headers = BTreeMap::new();
    headers.insert(HEADER_USER_ID.to_owned(), user_id.to_owned());
    headers.insert(HEADER_ACCEPT.to_owned(), accept.to_owned());
    headers.insert(HEADER_CONTENT_TYPE.to_owned(), ACCEPT_JSON.to_owned());

    let ua = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

fn default_user_agent() -> String {
    format!(
        "smart-notebook/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
