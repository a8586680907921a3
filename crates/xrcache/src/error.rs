//! Error types for cache operations.

use std::path::PathBuf;

/// Errors raised by the cache engine.
///
/// Every variant either aborts the call explicitly or, for
/// [`CacheError::StorageWrite`] inside a cached invocation, degrades to
/// "computed but not persisted". None of them ever leads to a stale or
/// mismatched object being returned.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The data argument carried no `hash` attribute and no override was given.
    #[error("input to '{function}' has no 'hash' attribute; tag the data before caching")]
    MissingInputHash {
        /// Name of the wrapped function being called.
        function: String,
    },

    /// A parameter could not be bound or canonicalized.
    #[error("cannot canonicalize parameter '{parameter}': {reason}")]
    Signature {
        /// The offending parameter (or a positional placeholder).
        parameter: String,
        /// Description of the failure.
        reason: String,
    },

    /// An indexed entry or the index itself could not be read.
    #[error("cache read failed at {path}: {source}")]
    StorageRead {
        /// The file that failed.
        path: PathBuf,
        /// The underlying cause.
        source: CodecError,
    },

    /// A computed result or the index could not be persisted.
    #[error("cache write failed at {path}: {source}")]
    StorageWrite {
        /// The file that failed.
        path: PathBuf,
        /// The underlying cause.
        source: CodecError,
    },
}

impl CacheError {
    pub(crate) fn signature(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signature {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: CodecError) -> Self {
        Self::StorageRead {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: CodecError) -> Self {
        Self::StorageWrite {
            path: path.into(),
            source,
        }
    }
}

/// Low-level causes of storage failures.
///
/// Produced by [`ObjectCodec`](crate::codec::ObjectCodec) implementations and
/// by index persistence; wrapped into [`CacheError::StorageRead`] or
/// [`CacheError::StorageWrite`] together with the affected path.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The index file could not be parsed as valid JSON.
    #[error("failed to parse cache index: {reason}")]
    IndexParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// An object file has an invalid or missing header.
    #[error("invalid object header: {reason}")]
    InvalidHeader {
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the checksum of the payload.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The checksum recorded in the header.
        expected: String,
        /// The checksum computed from the payload.
        actual: String,
    },

    /// The file format version does not match the current version.
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The format version this build reads.
        expected: u32,
        /// The format version found in the file.
        actual: u32,
    },

    /// A stored object does not carry the key it is indexed under.
    #[error("stored object has hash {actual}, index expects {expected}")]
    IdentityMismatch {
        /// The key recorded in the index.
        expected: String,
        /// The `hash` attribute found on the loaded object.
        actual: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

/// Error returned by a cached call.
///
/// Wrapped-function errors are carried unchanged in [`InvokeError::Function`];
/// engine failures are in [`InvokeError::Cache`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError<E> {
    /// The caching engine refused or failed the call.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The wrapped function itself failed.
    #[error("{0}")]
    Function(E),
}

impl<E> InvokeError<E> {
    /// Returns the wrapped function's error, if that is what failed.
    pub fn into_function_error(self) -> Option<E> {
        match self {
            Self::Function(e) => Some(e),
            Self::Cache(_) => None,
        }
    }

    /// Returns the engine error, if the engine failed.
    pub fn as_cache_error(&self) -> Option<&CacheError> {
        match self {
            Self::Cache(e) => Some(e),
            Self::Function(_) => None,
        }
    }
}
