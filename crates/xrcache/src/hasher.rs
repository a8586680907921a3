//! Content and structural hashing.
//!
//! Both hashes are SHA-256 hex digests. `content_hash` digests raw bytes;
//! `structural_hash` digests the canonical serialization of a structured
//! value, produced by [`canonical_json_bytes`]. Pure functions, no I/O.

use serde_json::{Map, Value};
use xrcache_common::ContentHash;

/// Hex digest of an exact byte sequence.
pub fn content_hash(bytes: &[u8]) -> String {
    ContentHash::from_bytes(bytes).to_hex()
}

/// Hex digest of a structured value's canonical bytes.
pub fn structural_hash(canonical_bytes: &[u8]) -> String {
    content_hash(canonical_bytes)
}

/// Serializes a JSON value with every object's keys sorted, recursively.
///
/// The output does not depend on the order keys were inserted in, nor on
/// whether `serde_json` was built with insertion-order preservation.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let canonical = canonicalize_json(value);
    // Serializing a `Value` to memory cannot fail.
    serde_json::to_vec(&canonical).unwrap_or_default()
}

/// Returns a copy of `value` with object keys in sorted order.
pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize_json(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}
