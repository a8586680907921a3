//! The data object model: a named numeric buffer with metadata attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attrs::Attributes;
use crate::hash::ContentHash;

/// Dtype tag used by [`ArrayBuffer::from_f64`].
pub const DTYPE_F64: &str = "float64";

/// A raw multi-dimensional numeric buffer.
///
/// The caching engine treats the buffer as opaque bytes; `dtype` and `shape`
/// only matter to the array library that produced it and to the content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayBuffer {
    /// Element type tag (e.g. `"float64"`).
    pub dtype: String,
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Raw element bytes in row-major order.
    pub bytes: Vec<u8>,
}

impl ArrayBuffer {
    /// Creates a buffer from its raw parts.
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            dtype: dtype.into(),
            shape,
            bytes,
        }
    }

    /// Creates a `float64` buffer with little-endian element encoding.
    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(DTYPE_F64, shape, bytes)
    }

    /// Decodes a `float64` buffer, returning `None` for any other dtype or a
    /// byte length that is not a multiple of eight.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        if self.dtype != DTYPE_F64 || self.bytes.len() % 8 != 0 {
            return None;
        }
        let values = self
            .bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                f64::from_le_bytes(raw)
            })
            .collect();
        Some(values)
    }

    /// Number of elements implied by the shape.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Content hash over dtype, shape and bytes.
    pub fn content_hash(&self) -> ContentHash {
        let shape: Vec<u8> = self
            .shape
            .iter()
            .flat_map(|d| (*d as u64).to_le_bytes())
            .collect();
        ContentHash::from_parts([self.dtype.as_bytes(), shape.as_slice(), self.bytes.as_slice()])
    }
}

/// A named array with metadata: the unit the caching engine memoizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    /// Array name; used as the display prefix of cache file names.
    pub name: String,
    /// The numeric payload.
    pub buffer: ArrayBuffer,
    /// Metadata attributes, including the `hash` identity tag.
    pub attrs: Attributes,
}

impl DataObject {
    /// Creates an object with no attributes.
    pub fn new(name: impl Into<String>, buffer: ArrayBuffer) -> Self {
        Self {
            name: name.into(),
            buffer,
            attrs: Attributes::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key, value);
        self
    }

    /// Builder-style `hash` tag.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.attrs.set_hash(hash);
        self
    }

    /// Computes the buffer's content hash and stores it as the `hash`
    /// attribute, returning the hex digest.
    pub fn tag_content_hash(&mut self) -> String {
        let hash = self.buffer.content_hash().to_hex();
        self.attrs.set_hash(hash.clone());
        hash
    }

    /// The `hash` attribute, if the object has been tagged.
    pub fn hash(&self) -> Option<&str> {
        self.attrs.hash()
    }
}
