//! Transport-only HTTP client for the notebook backend.
//!
//! This crate owns request building, response parsing, and raw body streaming
//! for the notebook endpoints. It does not decode the chat stream's frames and
//! holds no transcript state: `stream_chat_with_handler` forwards body chunks
//! verbatim and leaves framing to the caller.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod url;

pub use client::{CancellationSignal, NotebookApiClient};
pub use config::NotebookApiConfig;
pub use error::NotebookApiError;
pub use payload::ChatPayload;
pub use reqwest::StatusCode;
pub use url::{normalize_api_base, DEFAULT_API_PREFIX, DEFAULT_BASE_URL};
