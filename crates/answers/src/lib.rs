//! Answer-tree snapshot store for hostmeta.
//!
//! A snapshot ([`Versions`]) maps metadata version tags to per-client answer
//! trees. Lookups resolve a `(version, client, path)` triple against the
//! snapshot with the documented fallbacks: a client without its own view
//! falls back to the shared `default` view, sequences can be traversed by
//! index or by the `name`/`uuid` of a child mapping, and a failed walk is
//! retried once with the path lowercased.
//!
//! Trees are plain [`serde_json::Value`]s (with `preserve_order`, so
//! mappings keep insertion order). Snapshots are immutable once published;
//! the materializer in `hostmeta-ingest` is the only producer.

mod store;

pub use store::value_for_path;

use std::collections::HashMap;

/// The reserved client key holding answers shared by every caller.
pub const DEFAULT_CLIENT: &str = "default";

/// The version tag aliasing the newest supported version.
pub const LATEST_TAG: &str = "latest";

/// Top-level key carrying the opaque republish token in every client view.
pub const VERSION_KEY: &str = "version";

/// Top-level key carrying merged external environments (V3 only).
pub const ENVIRONMENTS_KEY: &str = "environments";

pub const METADATA_VERSION_1: &str = "2015-07-25";
pub const METADATA_VERSION_2: &str = "2015-12-19";
pub const METADATA_VERSION_3: &str = "2016-07-29";

/// Version tags a local source materializes, oldest first.
pub const SUPPORTED_VERSIONS: [&str; 3] = [
    METADATA_VERSION_1,
    METADATA_VERSION_2,
    METADATA_VERSION_3,
];

/// Fields checked, in order, when a non-numeric path segment is resolved
/// against a sequence of mappings.
pub const MAGIC_LOOKUP_KEYS: [&str; 2] = ["name", "uuid"];

/// A single answer tree: any JSON-like value.
pub type AnswerTree = serde_json::Value;

/// Answers for one metadata version: client key (IP literal or
/// [`DEFAULT_CLIENT`]) to answer tree.
pub type Answers = HashMap<String, AnswerTree>;

/// An immutable snapshot of all versions and client views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Versions {
    map: HashMap<String, Answers>,
}

impl Versions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn insert(&mut self, tag: impl Into<String>, answers: Answers) {
        self.map.insert(tag.into(), answers);
    }

    pub fn get(&self, tag: &str) -> Option<&Answers> {
        self.map.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Answers> {
        self.map.get_mut(tag)
    }

    /// All version tags present in the snapshot, in no particular order.
    pub fn tags(&self) -> Vec<&str> {
        self.map.keys().map(String::as_str).collect()
    }

    /// Resolve a requested tag to one present in the snapshot.
    ///
    /// `latest` resolves to the ASCII-betically highest tag when the
    /// snapshot never declared it.
    pub fn resolve_tag<'a>(&'a self, requested: &'a str) -> Option<&'a str> {
        if self.map.contains_key(requested) {
            return Some(requested);
        }
        if requested == LATEST_TAG {
            return self.map.keys().map(String::as_str).max();
        }
        None
    }
}
