//! Persisted compile-result cache for the Kiln engine.
//!
//! Entries live under a project-local cache directory, grouped into one
//! scope directory per plugin instance (plugin identity plus the fingerprint
//! of its defining source). Every entry carries a validated header and is
//! written atomically; every read is fail-safe, so a missing or corrupt cache
//! only ever costs a recompilation.

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod manifest;
pub mod store;

pub use entry::EntryStore;
pub use error::CacheError;
pub use manifest::{CacheManifest, ScopeRecord};
pub use store::{CacheStats, CacheStore, ScopedStore};
