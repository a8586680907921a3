//! Shared foundational types used across the xrcache workspace.
//!
//! This crate provides the content hash digest type and the data object model
//! (named array buffer plus metadata attributes) that the caching engine
//! memoizes.

#![warn(missing_docs)]

pub mod attrs;
pub mod hash;
pub mod object;

pub use attrs::Attributes;
pub use hash::{ContentHash, ParseHashError};
pub use object::{ArrayBuffer, DataObject};
