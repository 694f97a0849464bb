//! Delta ingest and answer materialization for hostmeta.
//!
//! The pipeline: an upstream source delivers a *delta* — a DEFLATE-compressed
//! stream of JSON objects, one per metadata record. The [`decode`] module
//! turns the stream into a flat record list; the [`Generator`] joins the
//! records through the [`Interim`] indexes and emits one fully denormalized
//! answer tree per supported metadata version; [`merge_versions`] folds
//! external snapshots and the opaque republish token into a local snapshot.
//!
//! The generator also owns the persisted delta cache: the raw compressed
//! bytes of the last good delta are written to disk (atomically, via
//! temp-file + rename) so a restart can rebuild the snapshot without waiting
//! for upstream.

mod decode;
mod error;
#[cfg(test)]
pub(crate) mod testutil;
mod generator;
mod interim;
mod merge;
mod persist;
mod record;

pub use decode::{decode_delta, RawRecord};
pub use error::IngestError;
pub use generator::Generator;
pub use interim::Interim;
pub use merge::merge_versions;
pub use persist::MetadataDelta;
pub use record::{service_key, Credential, RecordKind, METADATA_KIND};

/// Result type for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;
