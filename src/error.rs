use std::time::Duration;

use thiserror::Error;

/// Failures reported by the remote messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The remote refused the call because the request quota was exceeded (HTTP 429).
    #[error("rate limited by the remote API")]
    RateLimited { retry_after: Option<Duration> },

    /// The referenced conversation, message or user no longer exists.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote rejected the request or returned something we could not decode.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Network failure or any other error without a specific signal.
    #[error("request failed: {0}")]
    Transient(String),
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Map an HTTP status and response body onto the error taxonomy.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body.trim())
        };

        match status {
            429 => Self::RateLimited { retry_after },
            404 => Self::NotFound(detail),
            400 | 409 | 422 => Self::Invalid(detail),
            _ => Self::Transient(detail),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), None, &err.to_string());
        }
        if err.is_decode() {
            return Self::Invalid(err.to_string());
        }
        Self::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}
