//! Shared helpers for ingest tests.

use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::Value;

/// Compress a sequence of JSON objects the way upstream frames a delta:
/// a DEFLATE stream of concatenated objects, no array wrapper.
pub fn compress_objects(objects: &[Value]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    for object in objects {
        serde_json::to_writer(&mut encoder, object).unwrap();
    }
    encoder.finish().unwrap()
}
