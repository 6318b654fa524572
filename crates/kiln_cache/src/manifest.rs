//! Cache manifest recording which plugin scopes are live.
//!
//! The manifest is stored as `manifest.json` in the cache directory. Each
//! record maps a scope directory to the plugin identity and source
//! fingerprint that own it, so a restarted process can tell that a plugin's
//! source changed while it was not running and drop the stale scope.

use std::collections::BTreeMap;
use std::path::Path;

use kiln_common::{ContentHash, PackageId, PluginIdentity};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Name of the manifest file within the cache directory.
pub(crate) const MANIFEST_FILE: &str = "manifest.json";

/// Top-level cache manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Kiln version that produced this cache. Invalidate on version change.
    pub kiln_version: String,

    /// Live scopes keyed by scope directory name.
    pub scopes: BTreeMap<String, ScopeRecord>,
}

/// The owner of one scope directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRecord {
    /// Debug family of the plugin.
    pub family: String,
    /// Identity of the package that defines the plugin.
    pub identity: PluginIdentity,
    /// Fingerprint of the plugin's defining source.
    pub source_hash: ContentHash,
}

impl CacheManifest {
    /// Creates a new, empty manifest for the given Kiln version.
    pub fn new(kiln_version: &str) -> Self {
        Self {
            kiln_version: kiln_version.to_string(),
            scopes: BTreeMap::new(),
        }
    }

    /// Loads the manifest from the cache directory.
    ///
    /// Returns `None` if the file doesn't exist or can't be parsed, which
    /// callers treat as an empty cache.
    pub fn load(cache_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(cache_dir.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest atomically, creating the cache directory if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::io(cache_dir, e))?;
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let path = cache_dir.join(MANIFEST_FILE);
        let tmp = tempfile::NamedTempFile::new_in(cache_dir)
            .map_err(|e| CacheError::io(cache_dir, e))?;
        std::fs::write(tmp.path(), json).map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| CacheError::io(&path, e.error))?;
        Ok(())
    }

    /// Returns `true` if this manifest was produced by a compatible Kiln version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.kiln_version == current_version
    }

    /// Returns the scopes recorded for one plugin of `package`, across
    /// every version of the package.
    pub fn scopes_of<'a>(
        &'a self,
        package: &'a PackageId,
        family: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ScopeRecord)> + 'a {
        self.scopes.iter().filter(move |(_, record)| {
            &record.identity.package == package && record.family == family
        })
    }
}
