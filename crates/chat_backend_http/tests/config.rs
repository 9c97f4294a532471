use std::fs;
use std::time::Duration;

use chat_backend::ChatBackend;
use chat_backend_http::{ConfigError, HttpBackend, HttpBackendConfig, HTTP_BACKEND_ID};
use tempfile::tempdir;

#[test]
fn from_json_file_reads_all_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("http.json");
    fs::write(
        &path,
        r#"{"base_url":"https://notebook.example.com","api_prefix":"/v1","timeout_sec":45}"#,
    )
    .expect("write config");

    let config = HttpBackendConfig::from_json_file(&path).expect("config should load");
    assert_eq!(
        config,
        HttpBackendConfig::new("https://notebook.example.com")
            .with_api_prefix("/v1")
            .with_timeout_sec(45)
    );

    let api_config = config.to_api_config("user-7");
    assert_eq!(api_config.timeout, Some(Duration::from_secs(45)));

    let backend = HttpBackend::new(api_config).expect("backend should build");
    let profile = backend.profile();
    assert_eq!(profile.backend_id, HTTP_BACKEND_ID);
    assert_eq!(
        profile.endpoint.as_deref(),
        Some("https://notebook.example.com/v1")
    );
}

#[test]
fn from_json_file_rejects_unknown_fields() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("http.json");
    fs::write(&path, r#"{"base_url":"http://localhost:8000","token":"x"}"#).expect("write config");

    let error = HttpBackendConfig::from_json_file(&path).expect_err("unknown field should fail");
    assert!(matches!(error, ConfigError::Parse { .. }));
}

#[test]
fn from_json_file_rejects_zero_timeout() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("http.json");
    fs::write(&path, r#"{"base_url":"http://localhost:8000","timeout_sec":0}"#)
        .expect("write config");

    let error = HttpBackendConfig::from_json_file(&path).expect_err("zero timeout should fail");
    assert!(matches!(error, ConfigError::InvalidTimeout));
}

#[test]
fn from_json_file_reports_missing_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("missing.json");

    let error = HttpBackendConfig::from_json_file(&path).expect_err("missing file should fail");
    assert!(matches!(error, ConfigError::Read { .. }));
    assert!(error.to_string().contains("missing.json"));
}
