//! The on-disk answers file.
//!
//! The file holds the last good delta, not materialized answers:
//! `{"Version": "<source version>", "Data": "<base64 raw compressed delta>"}`.
//! Replacement is atomic — write to `<path>.temp`, then rename over the
//! target — so a reader never observes partial content.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{IngestError, Result};

/// The persisted form of a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataDelta {
    /// The source-issued version string of the delta.
    pub version: String,
    /// The raw compressed delta bytes.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

pub(crate) fn write_delta(path: &Path, delta: &MetadataDelta) -> Result<()> {
    let temp = temp_path(path);
    let result = (|| {
        let file = fs::File::create(&temp).map_err(|err| IngestError::io(&temp, err))?;
        serde_json::to_writer(file, delta).map_err(|err| IngestError::AnswersFile {
            path: temp.clone(),
            source: err,
        })?;
        fs::rename(&temp, path).map_err(|err| IngestError::io(path, err))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

pub(crate) fn read_delta(path: &Path) -> Result<MetadataDelta> {
    let file = fs::File::open(path).map_err(|err| IngestError::io(path, err))?;
    serde_json::from_reader(file).map_err(|err| IngestError::AnswersFile {
        path: path.to_path_buf(),
        source: err,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp = OsString::from(path.as_os_str());
    temp.push(".temp");
    PathBuf::from(temp)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "persist_test.rs"]
mod tests;
