use std::fmt;

use reqwest::StatusCode;
use serde_json::{Error as JsonError, Value};

#[derive(Debug)]
pub enum OllamaApiError {
    MissingModel,
    InvalidBaseUrl(String),
    Request(reqwest::Error),
    Status(StatusCode, String),
    MalformedResponse(String),
    Serde(JsonError),
    RetryExhausted {
        status: Option<StatusCode>,
        last_error: Option<String>,
    },
    StreamFailed(String),
    Cancelled,
    TimedOut,
    Unknown(String),
}

impl OllamaApiError {
    /// True for cutoffs that keep already-delivered output valid.
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut)
    }
}

impl fmt::Display for OllamaApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingModel => write!(f, "model name is required"),
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::MalformedResponse(message) => write!(f, "malformed response: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::RetryExhausted { status, last_error } => {
                let status = status
                    .map(|status| status.as_u16().to_string())
                    .unwrap_or_else(|| "n/a".to_owned());
                write!(f, "retry exhausted after max attempts (status: {status}, last_error: {last_error:?})")
            }
            Self::StreamFailed(message) => write!(f, "stream failed: {message}"),
            Self::Cancelled => write!(f, "request was cancelled"),
            Self::TimedOut => write!(f, "request timed out"),
            Self::Unknown(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for OllamaApiError {}

impl From<reqwest::Error> for OllamaApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error)
    }
}

impl From<JsonError> for OllamaApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Extracts a human-readable message from an error response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| match value.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            Some(Value::Object(fields)) => fields
                .get("message")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            _ => None,
        })
        .filter(|message| !message.trim().is_empty());

    if let Some(message) = from_json {
        return message;
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}
