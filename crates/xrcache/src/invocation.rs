//! Cached invocation of registered functions.
//!
//! A [`CachedFunction`] pairs a [`FunctionIdentity`] with the function body.
//! Each call walks a fixed sequence: extract the input hash, build the call
//! signature, compose the key, then either load the stored result or execute
//! the function, stamp provenance onto its result and persist it.

use xrcache_common::DataObject;
use xrcache_config::CacheSettings;

use crate::error::{CacheError, InvokeError};
use crate::index::CacheEntry;
use crate::key::{combine, CacheKey};
use crate::provenance::Provenance;
use crate::signature::{
    bind, encode, signature_hash, Args, BoundArgs, CallSignature, FunctionIdentity,
};
use crate::store::CacheStore;

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// When `false` the function runs directly, with no hashing and no
    /// store interaction.
    pub cache: bool,
    /// Input hash to use instead of the data object's `hash` attribute.
    pub hash_override: Option<String>,
    /// Emit an `info` trace record for every step of the call.
    pub verbose: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            cache: true,
            hash_override: None,
            verbose: false,
        }
    }
}

impl CallOptions {
    /// Options with caching on and nothing else set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults taken from configuration (`enabled`, `verbose`).
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            cache: settings.enabled,
            hash_override: None,
            verbose: settings.verbose,
        }
    }

    /// Turns caching on or off for this call.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Uses `hash` as the input hash.
    pub fn hash_override(mut self, hash: impl Into<String>) -> Self {
        self.hash_override = Some(hash.into());
        self
    }

    /// Turns step tracing on or off.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// How a call was satisfied.
#[derive(Debug)]
pub enum Outcome {
    /// Caching was disabled; the function ran and its result is unmodified.
    Bypassed,
    /// The result was loaded from the store.
    Hit {
        /// The entry that was loaded.
        entry: CacheEntry,
    },
    /// The function ran and its stamped result was handed to the store.
    Computed {
        /// The entry the result is indexed under, if the object was written.
        entry: Option<CacheEntry>,
        /// The write failure, if persisting failed. The result is still valid.
        persist_error: Option<CacheError>,
    },
}

impl Outcome {
    /// Returns `true` for [`Outcome::Hit`].
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

/// A call result together with how it was produced.
#[derive(Debug)]
pub struct Invocation {
    /// The returned data object.
    pub object: DataObject,
    /// How the call was satisfied.
    pub outcome: Outcome,
}

/// A function registered for cached invocation.
///
/// `func` receives the data object and the bound value parameters. It must
/// be pure with respect to those inputs; nothing checks this.
pub struct CachedFunction<F> {
    identity: FunctionIdentity,
    func: F,
}

impl<F> std::fmt::Debug for CachedFunction<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFunction")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<F> CachedFunction<F> {
    /// Registers `func` under `identity`, validating the parameter list.
    pub fn new(identity: FunctionIdentity, func: F) -> Result<Self, CacheError> {
        identity.validate()?;
        Ok(Self { identity, func })
    }

    /// The registered identity.
    pub fn identity(&self) -> &FunctionIdentity {
        &self.identity
    }

    /// Name of the registered function.
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// Binds and encodes `args` into the call signature.
    pub fn signature(&self, args: &Args) -> Result<CallSignature, CacheError> {
        encode(&self.identity, &bind(&self.identity, args)?)
    }

    /// The key a cached call with these inputs would use.
    pub fn cache_key(
        &self,
        data: &DataObject,
        args: &Args,
        hash_override: Option<&str>,
    ) -> Result<CacheKey, CacheError> {
        let hash_input = self.input_hash(data, hash_override)?;
        let signature = self.signature(args)?;
        combine(self.name(), hash_input, &signature_hash(&signature))
    }

    fn input_hash<'a>(
        &self,
        data: &'a DataObject,
        hash_override: Option<&'a str>,
    ) -> Result<&'a str, CacheError> {
        hash_override
            .filter(|h| !h.is_empty())
            .or_else(|| data.hash())
            .ok_or_else(|| CacheError::MissingInputHash {
                function: self.name().to_string(),
            })
    }

    fn step(&self, options: &CallOptions, state: &str, detail: &str) {
        if options.verbose {
            tracing::info!(function = %self.name(), state, "{detail}");
        }
    }
}

impl<F> CachedFunction<F> {
    /// Calls the function through the cache and returns its result.
    pub fn call<E>(
        &self,
        store: &CacheStore,
        data: &DataObject,
        args: &Args,
        options: &CallOptions,
    ) -> Result<DataObject, InvokeError<E>>
    where
        F: Fn(&DataObject, &BoundArgs) -> Result<DataObject, E>,
    {
        self.call_detailed(store, data, args, options)
            .map(|invocation| invocation.object)
    }

    /// Like [`CachedFunction::call`], also reporting the [`Outcome`].
    ///
    /// A corrupt or missing object behind an index entry fails with
    /// [`CacheError::StorageRead`] rather than recomputing. A failure to
    /// persist a computed result does not fail the call; it is logged and
    /// returned in [`Outcome::Computed`].
    pub fn call_detailed<E>(
        &self,
        store: &CacheStore,
        data: &DataObject,
        args: &Args,
        options: &CallOptions,
    ) -> Result<Invocation, InvokeError<E>>
    where
        F: Fn(&DataObject, &BoundArgs) -> Result<DataObject, E>,
    {
        if !options.cache {
            let bound = bind(&self.identity, args)?;
            self.step(options, "BYPASS", "caching disabled, executing");
            let object = (self.func)(data, &bound).map_err(InvokeError::Function)?;
            return Ok(Invocation {
                object,
                outcome: Outcome::Bypassed,
            });
        }

        let hash_input = self.input_hash(data, options.hash_override.as_deref())?;
        self.step(options, "EXTRACT_INPUT_HASH", hash_input);

        let bound = bind(&self.identity, args)?;
        let signature = encode(&self.identity, &bound)?;
        let hash_function = signature_hash(&signature);
        self.step(options, "BUILD_SIGNATURE", &hash_function);

        let key = combine(self.name(), hash_input, &hash_function)?;
        self.step(options, "COMPUTE_KEY", &key.hash);

        if let Some(entry) = store.lookup(&key) {
            self.step(options, "LOAD", &entry.display_name);
            let object = store.load(&entry)?;
            self.step(options, "RETURN_CACHED", &entry.display_name);
            return Ok(Invocation {
                object,
                outcome: Outcome::Hit { entry },
            });
        }

        self.step(options, "EXECUTE", "cache miss");
        let mut object = (self.func)(data, &bound).map_err(InvokeError::Function)?;

        Provenance::new(&key, signature, data.name.clone()).stamp(&mut object.attrs);
        self.step(options, "STAMP_METADATA", &key.hash);

        let outcome = match store.store(&key, &object, &data.name, self.name()) {
            Ok(stored) => {
                if let Some(e) = &stored.index_error {
                    tracing::warn!(
                        function = %self.name(),
                        error = %e,
                        "cache index not persisted"
                    );
                }
                self.step(options, "PERSIST", &stored.entry.display_name);
                Outcome::Computed {
                    entry: Some(stored.entry),
                    persist_error: stored.index_error,
                }
            }
            Err(e) => {
                tracing::warn!(
                    function = %self.name(),
                    error = %e,
                    "cache write failed, returning computed result"
                );
                Outcome::Computed {
                    entry: None,
                    persist_error: Some(e),
                }
            }
        };
        self.step(options, "RETURN_COMPUTED", &key.hash);

        Ok(Invocation { object, outcome })
    }
}
