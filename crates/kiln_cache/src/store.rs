//! The injected cache handle shared by every plugin instance.
//!
//! [`CacheStore`] is opened once per process for a project checkout and
//! handed to the engine; each plugin instance receives a [`ScopedStore`]
//! naming its own scope directory. A disabled store behaves like an empty
//! cache that forgets every write.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_common::{ContentHash, PluginIdentity};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entry::EntryStore;
use crate::error::CacheError;
use crate::manifest::{CacheManifest, ScopeRecord};

struct StoreInner {
    cache_dir: PathBuf,
    entries: EntryStore,
    manifest: Mutex<CacheManifest>,
    kiln_version: String,
}

/// Handle to the persisted cache of one project checkout.
#[derive(Clone)]
pub struct CacheStore {
    inner: Option<Arc<StoreInner>>,
}

/// Summary of what the cache directory holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Scopes recorded in the manifest.
    pub live_scopes: usize,
    /// Scope directories on disk that no live scope owns.
    pub orphaned_scopes: usize,
    /// Entries across live scopes.
    pub entries: usize,
}

impl CacheStore {
    /// Opens the cache at `cache_dir`, or starts an empty one.
    ///
    /// A manifest written by another Kiln version is discarded together with
    /// every scope directory, since entry encodings may differ. Nothing here
    /// fails: an unreadable cache is an empty cache.
    pub fn open(cache_dir: &Path, kiln_version: &str) -> Self {
        let entries = EntryStore::new(cache_dir);
        let manifest = match CacheManifest::load(cache_dir) {
            Some(m) if m.is_compatible(kiln_version) => m,
            Some(m) => {
                tracing::info!(
                    cached = %m.kiln_version,
                    current = %kiln_version,
                    "cache written by another version; starting fresh"
                );
                for scope in entries.scopes() {
                    if let Err(e) = entries.remove_scope(&scope) {
                        tracing::warn!(error = %e, "failed to remove stale cache scope");
                    }
                }
                CacheManifest::new(kiln_version)
            }
            None => CacheManifest::new(kiln_version),
        };
        Self {
            inner: Some(Arc::new(StoreInner {
                cache_dir: cache_dir.to_path_buf(),
                entries,
                manifest: Mutex::new(manifest),
                kiln_version: kiln_version.to_string(),
            })),
        }
    }

    /// Returns a store that persists nothing.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Returns `true` unless this is a disabled store.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Returns the cache directory, if enabled.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.inner.as_deref().map(|inner| inner.cache_dir.as_path())
    }

    /// Opens the scope for a plugin instance.
    ///
    /// Any other scope recorded for the same package and family belongs to
    /// an instance built from different plugin source or an older package
    /// version; it is removed from disk and from the manifest before the new
    /// scope is recorded.
    pub fn scope(
        &self,
        family: &str,
        identity: &PluginIdentity,
        source_hash: ContentHash,
    ) -> ScopedStore {
        let Some(inner) = &self.inner else {
            return ScopedStore::disabled();
        };
        let name = scope_name(family, identity, source_hash);
        let stale: Vec<String> = {
            let mut manifest = inner.manifest.lock();
            let stale: Vec<String> = manifest
                .scopes_of(&identity.package, family)
                .filter(|(scope, _)| **scope != name)
                .map(|(scope, _)| scope.clone())
                .collect();
            for scope in &stale {
                manifest.scopes.remove(scope);
            }
            manifest.scopes.insert(
                name.clone(),
                ScopeRecord {
                    family: family.to_string(),
                    identity: identity.clone(),
                    source_hash,
                },
            );
            stale
        };
        for scope in &stale {
            match inner.entries.remove_scope(scope) {
                Ok(_) => tracing::debug!(%scope, plugin = %identity, "invalidated stale plugin scope"),
                Err(e) => tracing::warn!(error = %e, "failed to remove stale plugin scope"),
            }
        }
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to save cache manifest");
        }
        ScopedStore {
            inner: Some(Arc::clone(inner)),
            scope: name,
        }
    }

    /// Forgets every scope record `keep` rejects. Their directories become
    /// orphans for [`gc`](Self::gc) to reclaim. Returns how many records were
    /// dropped.
    pub fn retain_scopes(&self, keep: impl Fn(&ScopeRecord) -> bool) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let dropped = {
            let mut manifest = inner.manifest.lock();
            let before = manifest.scopes.len();
            manifest.scopes.retain(|_, record| keep(record));
            before - manifest.scopes.len()
        };
        if dropped > 0 {
            tracing::debug!(dropped, "forgot cache scopes of removed plugins");
            if let Err(e) = self.save() {
                tracing::warn!(error = %e, "failed to save cache manifest");
            }
        }
        dropped
    }

    /// Persists the manifest.
    pub fn save(&self) -> Result<(), CacheError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let snapshot = inner.manifest.lock().clone();
        snapshot.save(&inner.cache_dir)
    }

    /// Removes scope directories no live scope owns. Returns how many were
    /// removed.
    pub fn gc(&self) -> Result<usize, CacheError> {
        let Some(inner) = &self.inner else {
            return Ok(0);
        };
        let mut removed = 0;
        for scope in self.orphans(inner) {
            if inner.entries.remove_scope(&scope)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes every scope and resets the manifest.
    pub fn clear(&self) -> Result<(), CacheError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        for scope in inner.entries.scopes() {
            inner.entries.remove_scope(&scope)?;
        }
        inner.manifest.lock().scopes.clear();
        self.save()
    }

    /// Counts live scopes, orphaned scopes and live entries.
    pub fn stats(&self) -> CacheStats {
        let Some(inner) = &self.inner else {
            return CacheStats::default();
        };
        let live: Vec<String> = inner.manifest.lock().scopes.keys().cloned().collect();
        CacheStats {
            live_scopes: live.len(),
            orphaned_scopes: self.orphans(inner).len(),
            entries: live.iter().map(|s| inner.entries.keys(s).len()).sum(),
        }
    }

    fn orphans(&self, inner: &StoreInner) -> Vec<String> {
        let manifest = inner.manifest.lock();
        inner
            .entries
            .scopes()
            .into_iter()
            .filter(|scope| !manifest.scopes.contains_key(scope))
            .collect()
    }
}

/// Builds a filesystem-safe scope directory name.
fn scope_name(family: &str, identity: &PluginIdentity, source_hash: ContentHash) -> String {
    let family: String = family
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!(
        "{family}-{}-{}",
        identity.fingerprint().short(),
        source_hash.short()
    )
}

/// One plugin instance's view of the persisted cache.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Option<Arc<StoreInner>>,
    scope: String,
}

impl ScopedStore {
    /// Returns a scope that persists nothing.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            scope: String::new(),
        }
    }

    /// Returns `true` unless this scope is disabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// The scope directory name.
    pub fn name(&self) -> &str {
        &self.scope
    }

    /// Reads and decodes an entry; any failure is a miss.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.as_ref()?;
        let bytes = inner.entries.read_entry(&self.scope, key)?;
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .ok()
            .map(|(value, _)| value)
    }

    /// Encodes and writes an entry atomically.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(
            |e| CacheError::Serialization {
                reason: e.to_string(),
            },
        )?;
        inner
            .entries
            .write_entry(&self.scope, key, &bytes, &inner.kiln_version)
    }

    /// Lists the keys in this scope.
    pub fn keys(&self) -> Vec<String> {
        match &self.inner {
            Some(inner) => inner.entries.keys(&self.scope),
            None => Vec::new(),
        }
    }
}
