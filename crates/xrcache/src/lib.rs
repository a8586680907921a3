//! Content-addressed on-disk memoization.
//!
//! A caller tags an input [`DataObject`](xrcache_common::DataObject) with a
//! content hash. A [`CachedFunction`] combines that hash with the hash of its
//! canonicalized call signature into a [`CacheKey`]; a [`CacheStore`] maps
//! keys to result files in one directory through its `hash.json` index.
//! Repeated calls with the same key load the stored result instead of
//! recomputing it.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod hasher;
pub mod index;
pub mod invocation;
pub mod key;
pub mod provenance;
pub mod signature;
pub mod store;

pub use codec::{BinaryCodec, ObjectCodec};
pub use error::{CacheError, CodecError, InvokeError};
pub use index::{CacheEntry, CacheIndex};
pub use invocation::{CachedFunction, CallOptions, Invocation, Outcome};
pub use key::CacheKey;
pub use provenance::Provenance;
pub use signature::{
    Args, BoundArgs, CallSignature, CanonicalParam, FunctionIdentity, ParamValue,
};
pub use store::{CacheStats, CacheStore, RebuildReport, Stored};
