//! Package and plugin identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{ContentHash, ContentHasher};

/// The name of a package in the build graph (e.g. `local-pack`,
/// `glasser:uses-sourcish`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    /// Creates a package id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the package name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The versioned identity of the package that defines a compiler plugin.
///
/// Disk cache entries are scoped by this identity together with the
/// fingerprint of the plugin's defining source, so editing the plugin
/// orphans every entry the previous instance produced.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct PluginIdentity {
    /// The package that defines the plugin.
    pub package: PackageId,
    /// The version of that package.
    pub version: String,
}

impl PluginIdentity {
    /// Creates a plugin identity.
    pub fn new(package: impl Into<PackageId>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
        }
    }

    /// Fingerprint of the identity itself, used to name its cache scope.
    pub fn fingerprint(&self) -> ContentHash {
        ContentHasher::new()
            .update_str(self.package.as_str())
            .update_str(&self.version)
            .finish()
    }
}

impl From<PackageId> for PluginIdentity {
    fn from(package: PackageId) -> Self {
        Self {
            package,
            version: String::new(),
        }
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.package)
        } else {
            write!(f, "{}@{}", self.package, self.version)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_display() {
        assert_eq!(PackageId::new("local-pack").to_string(), "local-pack");
    }

    #[test]
    fn identity_display_with_version() {
        let id = PluginIdentity::new("local-plugin", "0.0.1");
        assert_eq!(id.to_string(), "local-plugin@0.0.1");
    }

    #[test]
    fn identity_display_without_version() {
        let id = PluginIdentity::from(PackageId::new("local-plugin"));
        assert_eq!(id.to_string(), "local-plugin");
    }

    #[test]
    fn identity_fingerprint_depends_on_version() {
        let a = PluginIdentity::new("p", "1.0.0");
        let b = PluginIdentity::new("p", "1.0.1");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), PluginIdentity::new("p", "1.0.0").fingerprint());
    }
}
