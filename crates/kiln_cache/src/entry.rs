//! Header-validated cache entries with atomic writes.
//!
//! Each entry is stored at `<cache_dir>/<scope>/<key>.entry` as a 4-byte
//! little-endian header length, a bincode header, and the payload. The
//! header carries magic bytes, the entry format version, the Kiln version
//! that wrote it, and a checksum of the payload.

use std::io::Write;
use std::path::{Path, PathBuf};

use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a Kiln cache entry.
const ENTRY_MAGIC: [u8; 4] = *b"KILN";

/// Current entry format version. Increment on breaking changes to the header
/// or payload encoding.
const ENTRY_FORMAT_VERSION: u32 = 1;

/// File extension of cache entries.
const ENTRY_EXT: &str = "entry";

/// Header prepended to every cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryHeader {
    /// Magic bytes: must be `b"KILN"`.
    pub magic: [u8; 4],
    /// Entry format version.
    pub format_version: u32,
    /// Kiln version that produced this entry.
    pub kiln_version: String,
    /// Content hash of the payload.
    pub checksum: ContentHash,
}

/// Raw entry storage rooted at a cache directory.
pub struct EntryStore {
    cache_dir: PathBuf,
}

impl EntryStore {
    /// Creates an entry store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Returns the directory holding a scope's entries.
    pub fn scope_dir(&self, scope: &str) -> PathBuf {
        self.cache_dir.join(scope)
    }

    /// Returns the file path for an entry.
    pub fn entry_path(&self, scope: &str, key: &str) -> PathBuf {
        self.scope_dir(scope).join(format!("{key}.{ENTRY_EXT}"))
    }

    /// Writes an entry atomically.
    ///
    /// The bytes go to a temporary file in the scope directory which is then
    /// renamed over the final path, so a reader sees either the previous
    /// entry or the complete new one.
    pub fn write_entry(
        &self,
        scope: &str,
        key: &str,
        data: &[u8],
        kiln_version: &str,
    ) -> Result<(), CacheError> {
        let dir = self.scope_dir(scope);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let header = EntryHeader {
            magic: ENTRY_MAGIC,
            format_version: ENTRY_FORMAT_VERSION,
            kiln_version: kiln_version.to_string(),
            checksum: ContentHash::from_bytes(data),
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        let path = self.entry_path(scope, key);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tmp.write_all(&output)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;
        Ok(())
    }

    /// Reads an entry, validating its header.
    ///
    /// Returns `None` if the file is missing or truncated, the magic or
    /// format version is wrong, or the checksum does not verify.
    pub fn read_entry(&self, scope: &str, key: &str) -> Option<Vec<u8>> {
        let raw = std::fs::read(self.entry_path(scope, key)).ok()?;
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }
        let (header, _): (EntryHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .ok()?;
        if header.magic != ENTRY_MAGIC || header.format_version != ENTRY_FORMAT_VERSION {
            return None;
        }
        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return None;
        }
        Some(payload.to_vec())
    }

    /// Lists the keys stored in a scope, sorted. Unreadable scopes are empty.
    pub fn keys(&self, scope: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.scope_dir(scope)) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .collect();
        keys.sort();
        keys
    }

    /// Removes a whole scope directory. Returns `true` if it existed.
    pub fn remove_scope(&self, scope: &str) -> Result<bool, CacheError> {
        let dir = self.scope_dir(scope);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|e| CacheError::io(dir, e))?;
        Ok(true)
    }

    /// Lists scope directories present on disk, sorted.
    pub fn scopes(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.cache_dir) else {
            return Vec::new();
        };
        let mut scopes: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        scopes.sort();
        scopes
    }
}
