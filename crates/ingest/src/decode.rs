//! Delta stream decoding.
//!
//! A delta body is a DEFLATE stream of JSON objects concatenated back to
//! back — not a JSON array. The decoder inflates and parses the stream in
//! one pass and pulls the delta's version string out of the single
//! `defaultData` record.

use flate2::read::DeflateDecoder;
use serde_json::Value;

use crate::record::{RecordKind, METADATA_KIND};
use crate::{IngestError, Result};

/// One wire record: the raw JSON object, tag field included.
pub type RawRecord = serde_json::Map<String, Value>;

/// Decode a compressed delta body into its record list and version string.
///
/// The version comes from the `version` field of the `defaultData` record;
/// a delta without one decodes with an empty version. Any inflate or parse
/// failure aborts the whole delta.
pub fn decode_delta(body: &[u8]) -> Result<(Vec<RawRecord>, String)> {
    let reader = DeflateDecoder::new(body);
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<RawRecord>();

    let mut records = Vec::new();
    let mut version = String::new();

    for record in stream {
        let record = record.map_err(IngestError::Delta)?;
        if record.get(METADATA_KIND).and_then(Value::as_str).and_then(RecordKind::from_tag)
            == Some(RecordKind::DefaultData)
        {
            if let Some(v) = record.get("version").and_then(Value::as_str) {
                version = v.to_string();
            }
        }
        records.push(record);
    }

    Ok((records, version))
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;
