use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chat_backend::ChatBackend;
use chat_backend_http::{HttpBackend, HttpBackendConfig, HTTP_BACKEND_ID, HTTP_CONFIG_PATH_ENV_VAR};
use chat_backend_mock::{MockBackend, MOCK_BACKEND_ID};
use notebook_api::DEFAULT_BASE_URL;
use tracing::info;

pub const DEFAULT_BACKEND_ID: &str = MOCK_BACKEND_ID;
pub const BACKEND_ENV_VAR: &str = "NOTEBOOK_BACKEND";

/// Resolves the backend named by `NOTEBOOK_BACKEND`, defaulting to the mock.
pub fn backend_from_env(user_id: &str) -> anyhow::Result<Arc<dyn ChatBackend>> {
    let backend_id = non_empty_env(BACKEND_ENV_VAR);
    let config_path = non_empty_env(HTTP_CONFIG_PATH_ENV_VAR).map(PathBuf::from);

    backend_for_id(
        backend_id.as_deref().unwrap_or(DEFAULT_BACKEND_ID),
        user_id,
        config_path,
    )
}

pub fn backend_for_id(
    backend_id: &str,
    user_id: &str,
    http_config_path: Option<PathBuf>,
) -> anyhow::Result<Arc<dyn ChatBackend>> {
    match backend_id {
        MOCK_BACKEND_ID => Ok(Arc::new(MockBackend::new())),
        HTTP_BACKEND_ID => {
            let config = match http_config_path {
                Some(path) => HttpBackendConfig::from_json_file(&path)
                    .with_context(|| format!("loading {HTTP_CONFIG_PATH_ENV_VAR}"))?,
                None => HttpBackendConfig::new(DEFAULT_BASE_URL),
            };
            info!(base_url = %config.base_url, "using HTTP backend");
            let backend = HttpBackend::new(config.to_api_config(user_id))
                .context("building HTTP backend")?;
            Ok(Arc::new(backend))
        }
        unknown => bail!(
            "Unsupported backend '{unknown}'. Available backends: {MOCK_BACKEND_ID}, {HTTP_BACKEND_ID}"
        ),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
