//! Persistent cache index.
//!
//! The index is stored as `hash.json` in the cache directory and maps each
//! combined cache key to the entry describing its stored object. It is the
//! only authority for hit/miss decisions; file names are never parsed back
//! into keys.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CodecError};
use crate::key::CacheKey;

/// Name of the index file within the cache directory.
pub const INDEX_FILE: &str = "hash.json";

/// Current index format version. Increment on breaking changes.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// One stored result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key the result is stored under.
    pub key: CacheKey,
    /// Human-readable `{array}__{function}__{short}` name.
    pub display_name: String,
    /// Wrapped function that produced the result.
    pub function_name: String,
    /// Object file, relative to the cache directory.
    pub file_path: PathBuf,
    /// Name of the input array.
    pub array_name: String,
}

/// All entries of one cache directory, keyed by combined hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Format version of the file this index was read from.
    pub version: u32,

    /// Entries keyed by `CacheKey::hash`.
    pub entries: BTreeMap<String, CacheEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Path of the index file for a cache directory.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(INDEX_FILE)
    }

    /// Loads the index from the cache directory.
    ///
    /// A missing file is an empty index. An unreadable, unparseable or
    /// inconsistent file is a [`CacheError::StorageRead`]: silently starting
    /// over would orphan every stored object.
    pub fn load(cache_dir: &Path) -> Result<Self, CacheError> {
        let path = Self::path(cache_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(CacheError::read(path, e.into())),
        };
        Self::from_json(&content).map_err(|e| CacheError::read(path, e))
    }

    fn from_json(content: &str) -> Result<Self, CodecError> {
        let index: Self = serde_json::from_str(content).map_err(|e| CodecError::IndexParse {
            reason: e.to_string(),
        })?;
        if index.version != INDEX_FORMAT_VERSION {
            return Err(CodecError::VersionMismatch {
                expected: INDEX_FORMAT_VERSION,
                actual: index.version,
            });
        }
        if let Some((hash, _)) = index.entries.iter().find(|(h, e)| **h != e.key.hash) {
            return Err(CodecError::IndexParse {
                reason: format!("entry under '{hash}' records a different key"),
            });
        }
        if let Some(e) = index.iter().find(|e| !is_flat_file_name(&e.file_path)) {
            return Err(CodecError::IndexParse {
                reason: format!(
                    "entry '{}' points outside the cache directory",
                    e.file_path.display()
                ),
            });
        }
        Ok(index)
    }

    /// Saves the index atomically.
    ///
    /// The JSON is written to a temporary file in the same directory and
    /// renamed over `hash.json`, so readers see either the old or the new
    /// index, never a partial one. Creates the directory if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let path = Self::path(cache_dir);
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::write(cache_dir, e.into()))?;
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            CacheError::write(
                &path,
                CodecError::Serialization {
                    reason: e.to_string(),
                },
            )
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".hash.")
            .suffix(".tmp")
            .tempfile_in(cache_dir)
            .map_err(|e| CacheError::write(cache_dir, e.into()))?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CacheError::write(tmp.path(), e.into()))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::write(&path, e.error.into()))?;
        Ok(())
    }

    /// Looks up an entry by combined hash.
    pub fn get(&self, hash: &str) -> Option<&CacheEntry> {
        self.entries.get(hash)
    }

    /// Returns `true` if the key is indexed.
    pub fn contains(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// Inserts an entry unless its key is already present.
    ///
    /// Entries are immutable once written; returns `false` and leaves the
    /// existing entry in place if the key is taken.
    pub fn insert(&mut self, entry: CacheEntry) -> bool {
        if self.entries.contains_key(&entry.key.hash) {
            return false;
        }
        self.entries.insert(entry.key.hash.clone(), entry);
        true
    }

    /// The entry whose object lives at `file_path`, if any.
    pub fn entry_for_file(&self, file_path: &Path) -> Option<&CacheEntry> {
        self.entries.values().find(|e| e.file_path == file_path)
    }

    /// Adds every entry of `other` whose key is not yet present.
    pub fn merge(&mut self, other: Self) {
        for (hash, entry) in other.entries {
            self.entries.entry(hash).or_insert(entry);
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }
}

/// Returns `true` if `path` is a single plain file name.
pub(crate) fn is_flat_file_name(path: &Path) -> bool {
    let mut components = path.components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::combine;

    fn entry(input: &str, name: &str) -> CacheEntry {
        let key = combine("square", input, "S1").unwrap();
        CacheEntry {
            display_name: format!("{name}__square__{}", key.short(3)),
            file_path: PathBuf::from(format!("{name}__square__{}.xrc", key.short(3))),
            function_name: "square".to_string(),
            array_name: name.to_string(),
            key,
        }
    }

    #[test]
    fn new_index_is_empty() {
        let index = CacheIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.version, INDEX_FORMAT_VERSION);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        let e = entry("H1", "temp");
        index.insert(e.clone());
        index.save(dir.path()).unwrap();

        let loaded = CacheIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&e.key.hash), Some(&e));
    }

    #[test]
    fn load_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheIndex::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn load_corrupt_json_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "not valid json {{{").unwrap();
        let err = CacheIndex::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StorageRead {
                source: CodecError::IndexParse { .. },
                ..
            }
        ));
    }

    #[test]
    fn load_wrong_version_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version": 99, "entries": {}}"#,
        )
        .unwrap();
        let err = CacheIndex::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StorageRead {
                source: CodecError::VersionMismatch { actual: 99, .. },
                ..
            }
        ));
    }

    #[test]
    fn load_rejects_mismatched_entry_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        let e = entry("H1", "temp");
        index.entries.insert("bogus".to_string(), e);
        index.save(dir.path()).unwrap();
        assert!(CacheIndex::load(dir.path()).is_err());
    }

    #[test]
    fn load_rejects_entries_outside_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        let mut e = entry("H1", "temp");
        e.file_path = PathBuf::from("../temp__square__abc.xrc");
        index.insert(e);
        index.save(dir.path()).unwrap();
        let err = CacheIndex::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::StorageRead {
                source: CodecError::IndexParse { .. },
                ..
            }
        ));
    }

    #[test]
    fn flat_file_names() {
        assert!(is_flat_file_name(Path::new("temp__square__abc.xrc")));
        assert!(is_flat_file_name(Path::new(".x.xrc")));
        assert!(!is_flat_file_name(Path::new("../x.xrc")));
        assert!(!is_flat_file_name(Path::new("a/x.xrc")));
        assert!(!is_flat_file_name(Path::new("/x.xrc")));
        assert!(!is_flat_file_name(Path::new("..")));
        assert!(!is_flat_file_name(Path::new("")));
    }

    #[test]
    fn insert_never_overwrites() {
        let mut index = CacheIndex::new();
        let first = entry("H1", "first");
        let mut second = first.clone();
        second.display_name = "other".to_string();

        assert!(index.insert(first.clone()));
        assert!(!index.insert(second));
        assert_eq!(index.get(&first.key.hash), Some(&first));
    }

    #[test]
    fn merge_keeps_existing_entries() {
        let mut ours = CacheIndex::new();
        let mine = entry("H1", "mine");
        ours.insert(mine.clone());

        let mut theirs = CacheIndex::new();
        let mut conflicting = mine.clone();
        conflicting.display_name = "theirs".to_string();
        theirs.entries.insert(conflicting.key.hash.clone(), conflicting);
        let extra = entry("H2", "extra");
        theirs.insert(extra.clone());

        ours.merge(theirs);
        assert_eq!(ours.len(), 2);
        assert_eq!(ours.get(&mine.key.hash), Some(&mine));
        assert!(ours.contains(&extra.key.hash));
    }

    #[test]
    fn entry_for_file_lookup() {
        let mut index = CacheIndex::new();
        let e = entry("H1", "temp");
        index.insert(e.clone());
        assert_eq!(index.entry_for_file(&e.file_path), Some(&e));
        assert!(index.entry_for_file(Path::new("missing.xrc")).is_none());
    }

    #[test]
    fn save_creates_directory_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested");
        CacheIndex::new().save(&nested).unwrap();
        assert!(nested.join(INDEX_FILE).exists());

        let leftovers = std::fs::read_dir(&nested)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
