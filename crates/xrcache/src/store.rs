//! On-disk cache store.
//!
//! A [`CacheStore`] owns one cache directory: the object files written by its
//! [`ObjectCodec`], the `hash.json` index, and the lock file that serializes
//! index mutations across processes. Lookups only consult the in-memory
//! index; the directory listing is used for collision-free naming and for
//! [`CacheStore::rebuild_index`], never for hit/miss decisions.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs4::fs_std::FileExt;
use xrcache_common::DataObject;
use xrcache_config::CacheSettings;

use crate::codec::{BinaryCodec, ObjectCodec};
use crate::error::{CacheError, CodecError};
use crate::index::{is_flat_file_name, CacheEntry, CacheIndex, INDEX_FILE};
use crate::key::{display_name, CacheKey};
use crate::provenance::Provenance;

/// Name of the advisory lock file guarding index mutations.
pub const LOCK_FILE: &str = "hash.json.lock";

/// Default number of key characters kept in file names.
pub const DEFAULT_FILENAME_HASH_DIGITS: usize = 3;

/// Length of a full hex key; upper bound for the file name prefix.
const MAX_FILENAME_HASH_DIGITS: usize = 64;

/// Result of [`CacheStore::store`].
#[derive(Debug)]
pub struct Stored {
    /// The entry now indexed under the key.
    pub entry: CacheEntry,
    /// `false` if the key was already indexed and nothing was written.
    pub newly_written: bool,
    /// Set if the object file was written but the index could not be
    /// persisted. The in-memory index still holds the entry.
    pub index_error: Option<CacheError>,
}

/// Statistics about a cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of indexed entries.
    pub entries: usize,
    /// Total size of indexed object files in bytes.
    pub total_bytes: u64,
}

impl CacheStats {
    /// Format total_bytes as a human-readable string.
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;

        if self.total_bytes >= MB {
            format!("{:.1} MiB", self.total_bytes as f64 / MB as f64)
        } else if self.total_bytes >= KB {
            format!("{:.1} KiB", self.total_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes)
        }
    }
}

/// Outcome of [`CacheStore::rebuild_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Number of entries in the rebuilt index.
    pub indexed: usize,
    /// Object files that could not be indexed (unreadable, no provenance,
    /// or a duplicate of an already indexed key).
    pub skipped: Vec<PathBuf>,
}

/// Exclusive advisory lock on a cache directory; released on drop.
struct DirLock {
    file: File,
}

impl DirLock {
    fn acquire(dir: &Path) -> Result<Self, CacheError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| CacheError::write(&path, e.into()))?;
        FileExt::lock_exclusive(&file).map_err(|e| CacheError::write(&path, e.into()))?;
        Ok(Self { file })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Content-addressed store for data objects in one cache directory.
///
/// Safe to share between threads. Reads take a shared lock on the in-memory
/// index; writes are serialized per store and, through `hash.json.lock`,
/// across processes using the same directory.
pub struct CacheStore {
    dir: PathBuf,
    codec: Box<dyn ObjectCodec>,
    filename_hash_digits: usize,
    index: RwLock<CacheIndex>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("extension", &self.codec.extension())
            .field("filename_hash_digits", &self.filename_hash_digits)
            .field("entries", &self.len())
            .finish()
    }
}

impl CacheStore {
    /// Opens the store for `dir`, loading its index.
    ///
    /// Nothing is created on disk until the first write. A corrupt index is
    /// reported as [`CacheError::StorageRead`]; use [`CacheStore::recover`]
    /// to rebuild it from the stored objects.
    pub fn open(
        dir: impl Into<PathBuf>,
        codec: impl ObjectCodec + 'static,
    ) -> Result<Self, CacheError> {
        let dir = dir.into();
        let index = CacheIndex::load(&dir)?;
        tracing::debug!(dir = %dir.display(), entries = index.len(), "opened cache store");
        Ok(Self::with_index(dir, Box::new(codec), index))
    }

    /// Opens the store for `dir` with the default [`BinaryCodec`].
    pub fn open_default(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open(dir, BinaryCodec)
    }

    /// Opens the store described by configuration settings.
    pub fn from_settings(
        settings: &CacheSettings,
        codec: impl ObjectCodec + 'static,
    ) -> Result<Self, CacheError> {
        Ok(Self::open(settings.dir.clone(), codec)?
            .with_filename_hash_digits(settings.filename_hash_digits))
    }

    /// Opens the store for `dir` by rebuilding its index from the object
    /// files, ignoring whatever `hash.json` currently contains.
    pub fn recover(
        dir: impl Into<PathBuf>,
        codec: impl ObjectCodec + 'static,
    ) -> Result<(Self, RebuildReport), CacheError> {
        let store = Self::with_index(dir.into(), Box::new(codec), CacheIndex::new());
        let report = store.rebuild_index()?;
        Ok((store, report))
    }

    fn with_index(dir: PathBuf, codec: Box<dyn ObjectCodec>, index: CacheIndex) -> Self {
        Self {
            dir,
            codec,
            filename_hash_digits: DEFAULT_FILENAME_HASH_DIGITS,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        }
    }

    /// Sets how many key characters appear in new file names (clamped to
    /// `1..=64`). Only affects naming, never identity.
    pub fn with_filename_hash_digits(mut self, digits: usize) -> Self {
        self.filename_hash_digits = digits.clamp(1, MAX_FILENAME_HASH_DIGITS);
        self
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Key characters used in file names.
    pub fn filename_hash_digits(&self) -> usize {
        self.filename_hash_digits
    }

    /// Extension of object files written by the codec.
    pub fn extension(&self) -> &str {
        self.codec.extension()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, CacheIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, CacheIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `key` in the in-memory index.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.read_index().get(&key.hash).cloned()
    }

    /// Loads the object behind an index entry.
    ///
    /// A missing, unreadable or mismatching file is a
    /// [`CacheError::StorageRead`]: an index entry without a valid backing
    /// object means the cache is corrupt, which must not pass for a miss.
    pub fn load(&self, entry: &CacheEntry) -> Result<DataObject, CacheError> {
        let path = self.dir.join(&entry.file_path);
        let object = self
            .codec
            .load(&path)
            .map_err(|e| CacheError::read(&path, e))?;
        match object.hash() {
            Some(hash) if hash != entry.key.hash => Err(CacheError::read(
                &path,
                CodecError::IdentityMismatch {
                    expected: entry.key.hash.clone(),
                    actual: hash.to_string(),
                },
            )),
            _ => Ok(object),
        }
    }

    /// Persists `object` under `key`.
    ///
    /// Steps: build a collision-free file name, write the object through a
    /// temporary file renamed into place, insert the entry in memory, then
    /// atomically replace the index file. Failing before the rename leaves
    /// no file behind and returns [`CacheError::StorageWrite`]. Failing to
    /// persist the index still returns the entry, with the error in
    /// [`Stored::index_error`]. A key that is already indexed is never
    /// rewritten.
    pub fn store(
        &self,
        key: &CacheKey,
        object: &DataObject,
        array_name: &str,
        function_name: &str,
    ) -> Result<Stored, CacheError> {
        if let Some(entry) = self.lookup(key) {
            return Ok(Stored {
                entry,
                newly_written: false,
                index_error: None,
            });
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::write(&self.dir, e.into()))?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _dir_lock = DirLock::acquire(&self.dir)?;

        let on_disk = CacheIndex::load(&self.dir).map_err(read_to_write)?;
        let (display, file_name) = {
            let mut index = self.write_index();
            index.merge(on_disk);
            if let Some(entry) = index.get(&key.hash) {
                return Ok(Stored {
                    entry: entry.clone(),
                    newly_written: false,
                    index_error: None,
                });
            }
            self.build_file_name(&index, key, array_name, function_name)?
        };

        self.write_object(object, &file_name)?;

        let entry = CacheEntry {
            key: key.clone(),
            display_name: display,
            function_name: function_name.to_string(),
            file_path: file_name,
            array_name: array_name.to_string(),
        };
        let snapshot = {
            let mut index = self.write_index();
            index.insert(entry.clone());
            index.clone()
        };

        let index_error = snapshot.save(&self.dir).err();
        match &index_error {
            None => tracing::debug!(
                file = %entry.file_path.display(),
                key = %key.hash,
                "stored cache entry"
            ),
            Some(e) => tracing::debug!(
                file = %entry.file_path.display(),
                error = %e,
                "stored object but could not persist index"
            ),
        }

        Ok(Stored {
            entry,
            newly_written: true,
            index_error,
        })
    }

    /// Picks `{display}.{ext}`, falling back to the full key and then to a
    /// numeric suffix when the name is held by another key or by a file the
    /// index does not know about.
    fn build_file_name(
        &self,
        index: &CacheIndex,
        key: &CacheKey,
        array_name: &str,
        function_name: &str,
    ) -> Result<(String, PathBuf), CacheError> {
        let ext = self.codec.extension();
        let short = display_name(
            array_name,
            function_name,
            key.short(self.filename_hash_digits),
        );
        let full = display_name(array_name, function_name, &key.hash);

        let first = PathBuf::from(format!("{short}.{ext}"));
        if !is_flat_file_name(&first) {
            return Err(CacheError::write(
                self.dir.join(&first),
                CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "object file name is not a plain file name",
                )),
            ));
        }

        let mut candidates = vec![short, full.clone()];
        candidates.dedup();
        let mut suffix = 1usize;
        loop {
            for candidate in candidates.drain(..) {
                let file = PathBuf::from(format!("{candidate}.{ext}"));
                let claimed = index
                    .entry_for_file(&file)
                    .is_some_and(|e| e.key.hash != key.hash);
                if !claimed && !self.dir.join(&file).exists() {
                    return Ok((candidate, file));
                }
                tracing::debug!(file = %file.display(), "cache file name taken, trying next");
            }
            candidates.push(format!("{full}-{suffix}"));
            suffix += 1;
        }
    }

    fn write_object(&self, object: &DataObject, file_name: &Path) -> Result<(), CacheError> {
        let target = self.dir.join(file_name);
        let tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| CacheError::write(&self.dir, e.into()))?
            .into_temp_path();
        self.codec
            .save(object, &tmp)
            .map_err(|e| CacheError::write(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| CacheError::write(&target, e.error.into()))
    }

    /// Snapshot of all entries in key order.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.read_index().iter().cloned().collect()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.read_index().is_empty()
    }

    /// Re-reads the index file, replacing the in-memory index.
    pub fn reload(&self) -> Result<(), CacheError> {
        let index = CacheIndex::load(&self.dir)?;
        *self.write_index() = index;
        Ok(())
    }

    /// Entry count and bytes on disk of indexed objects.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.entries();
        let mut total_bytes = 0;
        for entry in &entries {
            let path = self.dir.join(&entry.file_path);
            match std::fs::metadata(&path) {
                Ok(meta) => total_bytes += meta.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::read(path, e.into())),
            }
        }
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes,
        })
    }

    /// Entries whose backing file is missing.
    pub fn verify(&self) -> Vec<CacheEntry> {
        self.read_index()
            .iter()
            .filter(|e| !self.dir.join(&e.file_path).is_file())
            .cloned()
            .collect()
    }

    /// Rebuilds the index from the object files in the directory.
    ///
    /// Every file with the codec's extension is loaded and indexed under the
    /// key recorded in its provenance attributes. The new index replaces the
    /// old one in memory and on disk.
    pub fn rebuild_index(&self) -> Result<RebuildReport, CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::write(&self.dir, e.into()))?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _dir_lock = DirLock::acquire(&self.dir)?;

        let read_dir =
            std::fs::read_dir(&self.dir).map_err(|e| CacheError::read(&self.dir, e.into()))?;
        let mut files = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::read(&self.dir, e.into()))?;
            let path = entry.path();
            // Temporary files end in `.tmp` and never match the codec extension.
            let ext = path.extension().and_then(|e| e.to_str());
            if path.is_file() && ext == Some(self.codec.extension()) {
                files.push(path);
            }
        }
        files.sort();

        let mut index = CacheIndex::new();
        let mut report = RebuildReport::default();
        for path in files {
            let Some(file_path) = path.file_name().map(PathBuf::from) else {
                continue;
            };
            let provenance = match self.codec.load(&path) {
                Ok(object) => Provenance::from_attrs(&object.attrs),
                Err(e) => {
                    tracing::debug!(
                        file = %path.display(),
                        error = %e,
                        "skipping unreadable cache file"
                    );
                    None
                }
            };
            let Some(provenance) = provenance else {
                report.skipped.push(path);
                continue;
            };
            let display = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entry = CacheEntry {
                key: provenance.key(),
                display_name: display,
                function_name: provenance.function_name().to_string(),
                file_path,
                array_name: provenance.array_name.clone(),
            };
            if !index.insert(entry) {
                report.skipped.push(path);
            }
        }
        report.indexed = index.len();

        index.save(&self.dir)?;
        *self.write_index() = index;
        tracing::debug!(
            dir = %self.dir.display(),
            indexed = report.indexed,
            skipped = report.skipped.len(),
            "rebuilt cache index"
        );
        Ok(report)
    }
}

fn read_to_write(err: CacheError) -> CacheError {
    match err {
        CacheError::StorageRead { path, source } => CacheError::StorageWrite { path, source },
        other => other,
    }
}
