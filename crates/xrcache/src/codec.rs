//! Object serialization capability and the default binary codec.
//!
//! The store never serializes objects itself; it delegates to an injected
//! [`ObjectCodec`]. [`BinaryCodec`] is the codec used when the caller does
//! not bring one: a header with magic bytes, format version and a payload
//! checksum, followed by the bincode-encoded object.

use std::path::Path;

use serde::{Deserialize, Serialize};
use xrcache_common::{ArrayBuffer, Attributes, DataObject};

use crate::error::CodecError;

/// Save/load capability for data objects.
///
/// Implementations must be safe to share between threads; the store calls
/// them from whichever thread performs the cached call.
pub trait ObjectCodec: Send + Sync {
    /// File extension (without the dot) of files this codec writes.
    fn extension(&self) -> &str;

    /// Writes `object` to `path`, replacing any existing file.
    fn save(&self, object: &DataObject, path: &Path) -> Result<(), CodecError>;

    /// Reads an object previously written by [`ObjectCodec::save`].
    fn load(&self, path: &Path) -> Result<DataObject, CodecError>;
}

/// Magic bytes identifying an xrcache object file.
const OBJECT_MAGIC: [u8; 4] = *b"XRCO";

/// Current object format version. Increment on breaking changes to the
/// header or payload format.
const OBJECT_FORMAT_VERSION: u32 = 1;

/// Header prepended to every object file for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectHeader {
    /// Magic bytes: must be `b"XRCO"`.
    pub magic: [u8; 4],

    /// Object format version.
    pub format_version: u32,

    /// XXH3-128 checksum of the payload.
    pub checksum: u128,
}

/// Payload layout. Attributes travel as a JSON string because bincode
/// cannot decode self-describing JSON values.
#[derive(Serialize, Deserialize)]
struct ObjectRecord {
    name: String,
    buffer: ArrayBuffer,
    attrs_json: String,
}

/// Self-validating binary codec (`.xrc` files).
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// File extension used by this codec.
    pub const EXTENSION: &'static str = "xrc";

    /// Encodes an object as `header length (u32 LE) + header + payload`.
    pub fn encode(&self, object: &DataObject) -> Result<Vec<u8>, CodecError> {
        let attrs_json =
            serde_json::to_string(&object.attrs).map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;
        let record = ObjectRecord {
            name: object.name.clone(),
            buffer: object.buffer.clone(),
            attrs_json,
        };
        let payload = bincode::serde::encode_to_vec(&record, bincode::config::standard())
            .map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;

        let header = ObjectHeader {
            magic: OBJECT_MAGIC,
            format_version: OBJECT_FORMAT_VERSION,
            checksum: xxhash_rust::xxh3::xxh3_128(&payload),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Decodes and validates bytes produced by [`BinaryCodec::encode`].
    pub fn decode(&self, raw: &[u8]) -> Result<DataObject, CodecError> {
        let Some((len_bytes, rest)) = raw.split_first_chunk::<4>() else {
            return Err(CodecError::InvalidHeader {
                reason: "file shorter than the header length prefix".to_string(),
            });
        };
        let header_len = u32::from_le_bytes(*len_bytes) as usize;
        if rest.len() < header_len {
            return Err(CodecError::InvalidHeader {
                reason: format!("truncated header: need {header_len} bytes, have {}", rest.len()),
            });
        }
        let (header_bytes, payload) = rest.split_at(header_len);

        let (header, _): (ObjectHeader, usize) =
            bincode::serde::decode_from_slice(header_bytes, bincode::config::standard()).map_err(
                |e| CodecError::InvalidHeader {
                    reason: e.to_string(),
                },
            )?;

        if header.magic != OBJECT_MAGIC {
            return Err(CodecError::InvalidHeader {
                reason: "missing magic bytes".to_string(),
            });
        }
        if header.format_version != OBJECT_FORMAT_VERSION {
            return Err(CodecError::VersionMismatch {
                expected: OBJECT_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        let actual = xxhash_rust::xxh3::xxh3_128(payload);
        if actual != header.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: format!("{:032x}", header.checksum),
                actual: format!("{actual:032x}"),
            });
        }

        let (record, _): (ObjectRecord, usize) =
            bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(
                |e| CodecError::Serialization {
                    reason: e.to_string(),
                },
            )?;
        let attrs: Attributes =
            serde_json::from_str(&record.attrs_json).map_err(|e| CodecError::Serialization {
                reason: e.to_string(),
            })?;
        Ok(DataObject {
            name: record.name,
            buffer: record.buffer,
            attrs,
        })
    }
}

impl ObjectCodec for BinaryCodec {
    fn extension(&self) -> &str {
        Self::EXTENSION
    }

    fn save(&self, object: &DataObject, path: &Path) -> Result<(), CodecError> {
        let bytes = self.encode(object)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<DataObject, CodecError> {
        let raw = std::fs::read(path)?;
        self.decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataObject {
        DataObject::new("bar", ArrayBuffer::from_f64(vec![2, 2], &[1.0, 4.0, 9.0, 16.0]))
            .with_hash("H1")
            .with_attr("units", "m^2")
    }

    fn frame(header: &ObjectHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        output
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar.xrc");
        let obj = sample();
        BinaryCodec.save(&obj, &path).unwrap();
        assert_eq!(BinaryCodec.load(&path).unwrap(), obj);
    }

    #[test]
    fn load_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BinaryCodec.load(&dir.path().join("nope.xrc")).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }

    #[test]
    fn truncated_prefix_rejected() {
        let err = BinaryCodec.decode(b"AB").unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader { .. }));
    }

    #[test]
    fn garbage_rejected() {
        assert!(BinaryCodec.decode(b"garbage data that is not an object").is_err());
    }

    #[test]
    fn wrong_magic_rejected() {
        let header = ObjectHeader {
            magic: *b"BAAD",
            format_version: OBJECT_FORMAT_VERSION,
            checksum: xxhash_rust::xxh3::xxh3_128(b"data"),
        };
        let err = BinaryCodec.decode(&frame(&header, b"data")).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn wrong_version_rejected() {
        let header = ObjectHeader {
            magic: OBJECT_MAGIC,
            format_version: 999,
            checksum: xxhash_rust::xxh3::xxh3_128(b"data"),
        };
        let err = BinaryCodec.decode(&frame(&header, b"data")).unwrap_err();
        assert!(matches!(
            err,
            CodecError::VersionMismatch { actual: 999, .. }
        ));
    }

    #[test]
    fn tampered_payload_rejected() {
        let mut raw = BinaryCodec.encode(&sample()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let err = BinaryCodec.decode(&raw).unwrap_err();
        assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
    }

    #[test]
    fn large_payload_roundtrip() {
        let values: Vec<f64> = (0..10_000).map(f64::from).collect();
        let obj = DataObject::new("big", ArrayBuffer::from_f64(vec![100, 100], &values));
        let raw = BinaryCodec.encode(&obj).unwrap();
        assert_eq!(BinaryCodec.decode(&raw).unwrap(), obj);
    }
}
