//! Error types for quill-relay

use thiserror::Error;

/// Result type alias using quill-relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the relay
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (connection refused, reset, DNS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay did not answer within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// The relay answered with a non-success status
    #[error("Relay returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The success body was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Classify a reqwest failure, separating timeouts from other transport errors
    pub fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    /// Build a status error from the raw response body.
    ///
    /// The relay reports failures as `{"error": "..."}`; when the body has that
    /// shape its message is used, otherwise the raw body is kept.
    pub fn status(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: Option<String>,
        }

        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| body.trim().to_string());

        Self::Status { status, message }
    }

    /// HTTP status code, if the relay answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure happened before any response arrived
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout)
    }
}
