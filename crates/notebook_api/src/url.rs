/// Default backend origin used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Path prefix every backend router is mounted under.
pub const DEFAULT_API_PREFIX: &str = "/api";

/// Normalize a base URL so that it ends with the API prefix.
///
/// Normalization rules:
/// 1) keep the base unchanged when it already ends with the prefix
/// 2) append the prefix otherwise
/// 3) an empty prefix leaves the trimmed base as-is
pub fn normalize_api_base(base_url: &str, api_prefix: &str) -> String {
    let base = if base_url.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        base_url.trim()
    };
    let base = base.trim_end_matches('/');

    let prefix = api_prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        return base.to_string();
    }

    if base.ends_with(&format!("/{prefix}")) {
        return base.to_string();
    }
    format!("{base}/{prefix}")
}
