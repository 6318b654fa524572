//! Content fingerprinting for cache keys and invalidation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit content fingerprint computed using XXH3.
///
/// Two inputs with the same `ContentHash` are assumed to have identical content.
/// Used as the cache-validity token for source files, plugin sources, and
/// composite cache keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Returns the first 16 hex characters, enough to name a directory.
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Incremental hasher for fingerprints built from several parts.
///
/// Every part is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` produce
/// different hashes.
pub struct ContentHasher {
    state: xxhash_rust::xxh3::Xxh3,
}

impl ContentHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self {
            state: xxhash_rust::xxh3::Xxh3::new(),
        }
    }

    /// Feeds one length-prefixed part into the hash.
    pub fn update(&mut self, part: &[u8]) -> &mut Self {
        self.state.update(&(part.len() as u64).to_le_bytes());
        self.state.update(part);
        self
    }

    /// Feeds a string part into the hash.
    pub fn update_str(&mut self, part: &str) -> &mut Self {
        self.update(part.as_bytes())
    }

    /// Feeds an existing fingerprint into the hash.
    pub fn update_hash(&mut self, hash: &ContentHash) -> &mut Self {
        self.update(&hash.0)
    }

    /// Returns the fingerprint of everything fed so far.
    pub fn finish(&self) -> ContentHash {
        ContentHash(self.state.digest128().to_le_bytes())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(b"hello world");
        let b = ContentHash::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentHash::from_bytes(b"hello");
        let b = ContentHash::from_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn display_format() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32, "Display should be 32 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(s.starts_with(&h.short()));
        assert_eq!(h.short().len(), 16);
    }

    #[test]
    fn debug_abbreviated() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h:?}");
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with(")"));
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn hasher_parts_are_length_prefixed() {
        let a = ContentHasher::new().update_str("ab").update_str("c").finish();
        let b = ContentHasher::new().update_str("a").update_str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn hasher_is_deterministic() {
        let inner = ContentHash::from_bytes(b"dep");
        let a = ContentHasher::new().update_str("x").update_hash(&inner).finish();
        let b = ContentHasher::new().update_str("x").update_hash(&inner).finish();
        assert_eq!(a, b);
    }
}
