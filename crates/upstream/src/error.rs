//! Upstream error types.

use thiserror::Error;

/// Errors raised while talking to an upstream source.
///
/// All of these are transient from the service's point of view: the
/// previous snapshot stays published and the next kick retries.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level HTTP failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered with a non-200 status.
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The downloaded delta did not decode.
    #[error(transparent)]
    Ingest(#[from] hostmeta_ingest::IngestError),

    /// The event channel failed or closed.
    #[error("event channel: {0}")]
    Channel(String),

    /// A `config.update` payload did not parse.
    #[error("malformed config.update payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl UpstreamError {
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }
}
