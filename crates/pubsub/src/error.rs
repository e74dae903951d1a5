//! Errors produced while publishing to Pub/Sub.
//!
//! A `SinkError` is reported by the relay and the message is dropped; none of
//! these variants trigger a retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink configuration is unusable (bad destination, bad endpoint).
    #[error("Sink setup error: {0}")]
    Setup(String),

    /// Transport failure: DNS, TCP, TLS or the request timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Publish rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// No access token could be obtained.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The service answered 2xx but the body was not understood.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),
}

impl SinkError {
    /// True for failures where the service never saw the request or may see
    /// it later; used only to pick the log wording.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SinkError::Http(e) if e.is_timeout())
    }
}
