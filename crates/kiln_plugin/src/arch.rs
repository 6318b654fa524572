//! Architecture identifiers and the cache tag derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An output architecture such as `web.browser` or `os`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Arch(String);

impl Arch {
    /// Creates an architecture from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the architecture name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this architecture belongs to `environment`.
    ///
    /// `client` selects the `web` family and `server` the `os` family. Any
    /// other environment matches the architecture of the same name and its
    /// dotted descendants, so `web.browser` matches `web.browser.legacy`.
    pub fn matches(&self, environment: &str) -> bool {
        match environment {
            "client" => self.is_within("web"),
            "server" => self.is_within("os"),
            other => self.is_within(other),
        }
    }

    fn is_within(&self, prefix: &str) -> bool {
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Arch {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The architecture component of a cache key.
///
/// Compilers whose output does not depend on the architecture cache under
/// [`ArchTag::Shared`], so every target reuses one result.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ArchTag {
    /// Output is identical for every architecture.
    Shared,
    /// Output is specific to one architecture.
    Arch(Arch),
}

impl ArchTag {
    /// Picks the tag for compiling on `arch`.
    pub fn for_arch(arch: &Arch, architecture_independent: bool) -> Self {
        if architecture_independent {
            ArchTag::Shared
        } else {
            ArchTag::Arch(arch.clone())
        }
    }
}

impl fmt::Display for ArchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchTag::Shared => f.write_str("shared"),
            ArchTag::Arch(arch) => write!(f, "{arch}"),
        }
    }
}
