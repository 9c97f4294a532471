use std::fmt;

use chat_backend::BackendError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum NotebookApiError {
    MissingUserId,
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Serde(JsonError),
    Cancelled,
    Unknown(String),
}

/// FastAPI error body: `{"detail": "..."}` or a list of validation issues.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub detail: Option<Value>,
}

impl ErrorPayload {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::String(message) => non_empty_string(message).map(ToOwned::to_owned),
            Value::Array(issues) => {
                let messages = issues
                    .iter()
                    .filter_map(|issue| issue.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for NotebookApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingUserId => write!(f, "user id is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for NotebookApiError {}

impl From<reqwest::Error> for NotebookApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for NotebookApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

impl From<NotebookApiError> for BackendError {
    fn from(error: NotebookApiError) -> Self {
        match error {
            NotebookApiError::Cancelled => BackendError::Cancelled,
            NotebookApiError::Status(status, message) => BackendError::Status {
                status: status.as_u16(),
                message,
            },
            NotebookApiError::Serde(error) => BackendError::Decode(error.to_string()),
            NotebookApiError::Request(error) if error.is_decode() => {
                BackendError::Decode(error.to_string())
            }
            other => BackendError::Transport(other.to_string()),
        }
    }
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
