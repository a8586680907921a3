//! Provenance attributes stamped onto computed results.

use xrcache_common::attrs::{ARRAY_NAME, HASH, HASH_FUNCTION, HASH_INPUT, SIGNATURE};
use xrcache_common::Attributes;

use crate::key::CacheKey;
use crate::signature::CallSignature;

/// How a cached result was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// The combined cache key; becomes the result's own `hash`.
    pub hash: String,
    /// Hash of the input data object.
    pub hash_input: String,
    /// Hash of the call signature.
    pub hash_function: String,
    /// The call signature itself.
    pub signature: CallSignature,
    /// Name of the input array; informational, not part of the key.
    pub array_name: String,
}

impl Provenance {
    /// Provenance for a result computed under `key`.
    pub fn new(key: &CacheKey, signature: CallSignature, array_name: impl Into<String>) -> Self {
        Self {
            hash: key.hash.clone(),
            hash_input: key.hash_input.clone(),
            hash_function: key.hash_function.clone(),
            signature,
            array_name: array_name.into(),
        }
    }

    /// Writes the provenance attributes, replacing any previous values.
    pub fn stamp(&self, attrs: &mut Attributes) {
        attrs.insert(HASH, self.hash.clone());
        attrs.insert(HASH_INPUT, self.hash_input.clone());
        attrs.insert(HASH_FUNCTION, self.hash_function.clone());
        attrs.insert(SIGNATURE, self.signature.to_record());
        attrs.insert(ARRAY_NAME, self.array_name.clone());
    }

    /// Reads provenance back from attributes.
    ///
    /// Returns `None` unless the four identity attributes are present and
    /// the signature record parses. A missing `array_name` reads as empty.
    pub fn from_attrs(attrs: &Attributes) -> Option<Self> {
        Some(Self {
            hash: attrs.hash()?.to_string(),
            hash_input: attrs.hash_input()?.to_string(),
            hash_function: attrs.hash_function()?.to_string(),
            signature: CallSignature::from_record(attrs.signature()?).ok()?,
            array_name: attrs.get_str(ARRAY_NAME).unwrap_or_default().to_string(),
        })
    }

    /// Name of the function that produced the result.
    pub fn function_name(&self) -> &str {
        &self.signature.function_name
    }

    /// The cache key the result is stored under.
    pub fn key(&self) -> CacheKey {
        CacheKey {
            hash_input: self.hash_input.clone(),
            hash_function: self.hash_function.clone(),
            hash: self.hash.clone(),
        }
    }
}
