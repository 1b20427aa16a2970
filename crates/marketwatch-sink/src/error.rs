//! Reporting sink errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The API could not be reached, or answered that it is temporarily
    /// unavailable (HTTP 503).
    #[error("core API unavailable: {0}")]
    Unavailable(String),

    /// The API answered with a non-success status.
    #[error("core API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other transport failure (timeout, broken body, ...).
    #[error("core API request failed: {0}")]
    Request(String),

    #[error("invalid core API configuration: {0}")]
    Config(String),
}

impl SinkError {
    /// Returns `true` for the one failure class the watcher logs and skips.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}
