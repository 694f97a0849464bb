//! Ingest error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while decoding a delta or touching the cache file.
///
/// Any of these abort the delta in flight; the previously published
/// snapshot stays authoritative.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The compressed record stream could not be inflated or parsed.
    #[error("malformed delta stream: {0}")]
    Delta(#[source] serde_json::Error),

    /// Filesystem error on the answers cache file.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The answers cache file exists but does not parse.
    #[error("malformed answers file {path}: {source}")]
    AnswersFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
