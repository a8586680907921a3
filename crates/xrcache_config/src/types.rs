//! Configuration types deserialized from `xrcache.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Default number of hex characters of the cache key kept in file names.
pub const DEFAULT_FILENAME_HASH_DIGITS: usize = 3;

/// The top-level configuration parsed from `xrcache.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct XrcacheConfig {
    /// Cache behavior settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Settings for the on-disk cache and the default call options.
///
/// ```toml
/// [cache]
/// dir = ".xrcache"
/// enabled = true
/// filename_hash_digits = 3
/// verbose = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Directory holding cached objects and the index file.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Whether cached calls consult the cache by default.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Length of the key prefix embedded in cache file names.
    #[serde(default = "default_filename_hash_digits")]
    pub filename_hash_digits: usize,
    /// Whether cached calls emit state-transition traces by default.
    #[serde(default)]
    pub verbose: bool,
}

fn default_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_enabled() -> bool {
    true
}

fn default_filename_hash_digits() -> usize {
    DEFAULT_FILENAME_HASH_DIGITS
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            enabled: default_enabled(),
            filename_hash_digits: default_filename_hash_digits(),
            verbose: false,
        }
    }
}

impl CacheSettings {
    /// Settings with defaults and the given cache directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}
