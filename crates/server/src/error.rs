//! Server error types.

use thiserror::Error;

/// Errors surfaced by the controller and the serving layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Startup requires answers and none can ever arrive: the answers
    /// file is missing and subscription is disabled.
    #[error("no answers file at {path} and subscription is disabled")]
    NoAnswers { path: String },

    /// A source's cached delta failed to load or decode.
    #[error(transparent)]
    Ingest(#[from] hostmeta_ingest::IngestError),
}
