//! Metadata attribute mapping carried by data objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute holding the content hash identifying an object.
pub const HASH: &str = "hash";
/// Attribute holding the input hash a cached result was derived from.
pub const HASH_INPUT: &str = "hash_input";
/// Attribute holding the hash of the call signature that produced a result.
pub const HASH_FUNCTION: &str = "hash_function";
/// Attribute holding the serialized call signature record.
pub const SIGNATURE: &str = "xrcache_signature";
/// Attribute holding the name of the input array a result was derived from.
pub const ARRAY_NAME: &str = "array_name";

/// The closed set of attribute keys the caching engine reads or writes.
pub const RECOGNIZED_KEYS: [&str; 5] = [HASH, HASH_INPUT, HASH_FUNCTION, SIGNATURE, ARRAY_NAME];

/// A string-keyed attribute mapping with JSON values.
///
/// Keys are kept sorted so that serialization, equality and display do not
/// depend on insertion order. Recognized keys (see [`RECOGNIZED_KEYS`]) are
/// validated through the typed accessors; every other key is carried through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    /// Creates an empty attribute mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Removes the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the `hash` attribute.
    ///
    /// Only a non-empty string counts as a hash; any other value is treated
    /// as absent so that a malformed tag can never masquerade as an identity.
    pub fn hash(&self) -> Option<&str> {
        self.get_str(HASH).filter(|h| !h.is_empty())
    }

    /// Sets the `hash` attribute.
    pub fn set_hash(&mut self, hash: impl Into<String>) {
        self.insert(HASH, hash.into());
    }

    /// Returns the `hash_input` attribute if it is a non-empty string.
    pub fn hash_input(&self) -> Option<&str> {
        self.get_str(HASH_INPUT).filter(|h| !h.is_empty())
    }

    /// Returns the `hash_function` attribute if it is a non-empty string.
    pub fn hash_function(&self) -> Option<&str> {
        self.get_str(HASH_FUNCTION).filter(|h| !h.is_empty())
    }

    /// Returns the serialized signature record, if present.
    pub fn signature(&self) -> Option<&str> {
        self.get_str(SIGNATURE)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Attributes {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}
