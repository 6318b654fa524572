//! Shared foundational types used across the Kiln compiler-cache engine.
//!
//! This crate provides content fingerprints and package and plugin identities
//! used as cache keys and cache scopes.

#![warn(missing_docs)]

pub mod hash;
pub mod package;

pub use hash::{ContentHash, ContentHasher};
pub use package::{PackageId, PluginIdentity};
