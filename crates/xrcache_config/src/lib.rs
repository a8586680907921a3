//! Parsing and validation of `xrcache.toml` cache configuration files.
//!
//! This crate reads the optional configuration file and produces a
//! strongly-typed [`CacheSettings`], with environment variable overrides
//! applied on top.

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod loader;
pub mod types;

pub use env::apply_env_overrides;
pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_settings};
pub use types::*;
