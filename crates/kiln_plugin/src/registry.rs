//! Routing of files to plugins by extension or file name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use kiln_common::PackageId;

use crate::arch::Arch;
use crate::error::PluginError;
use crate::input::InputFile;

/// What a plugin claims: an extension or an exact file name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Handle {
    /// Extension without the leading dot.
    Extension(String),
    /// Exact file name.
    Filename(String),
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Extension(ext) => write!(f, "*.{ext}"),
            Handle::Filename(name) => f.write_str(name),
        }
    }
}

/// Names one plugin: its defining package plus its debug family.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PluginKey {
    /// Defining package.
    pub package: PackageId,
    /// Debug family.
    pub family: String,
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.family)
    }
}

/// The owner of a handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// The plugin that claims the handle.
    pub plugin: PluginKey,
    /// Environment the plugin is restricted to, if any.
    pub arch_matching: Option<String>,
}

impl Registration {
    /// Returns `true` if the plugin builds for `arch`.
    pub fn applies_to(&self, arch: &Arch) -> bool {
        self.arch_matching
            .as_deref()
            .map_or(true, |env| arch.matches(env))
    }
}

/// Maps every handle to at most one plugin.
///
/// The registry also remembers every handle registered since it was created,
/// so a file whose plugin disappeared can be told apart from a file that
/// never had one.
#[derive(Default)]
pub struct PluginRegistry {
    handles: BTreeMap<Handle, Registration>,
    seen: BTreeSet<Handle>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` for a plugin.
    ///
    /// Fails with [`PluginError::Conflict`] if a plugin from another package
    /// already owns the handle; the existing registration is kept. A second
    /// registration from the same package replaces the first.
    pub fn register(&mut self, handle: Handle, registration: Registration) -> Result<(), PluginError> {
        if let Some(existing) = self.handles.get(&handle) {
            if existing.plugin.package != registration.plugin.package {
                return Err(PluginError::Conflict {
                    handle,
                    first: existing.plugin.package.clone(),
                    second: registration.plugin.package,
                });
            }
        }
        self.seen.insert(handle.clone());
        self.handles.insert(handle, registration);
        Ok(())
    }

    /// Finds the registration for a file: exact file name first, then
    /// extensions from longest to shortest.
    pub fn resolve(&self, file: &InputFile) -> Option<(&Handle, &Registration)> {
        let by_name = Handle::Filename(file.file_name().to_string());
        if let Some(found) = self.handles.get_key_value(&by_name) {
            return Some(found);
        }
        file.extensions()
            .find_map(|ext| self.handles.get_key_value(&Handle::Extension(ext.to_string())))
    }

    /// Returns the handle that used to match `file`, if one was ever
    /// registered.
    pub fn previously_handled(&self, file: &InputFile) -> Option<Handle> {
        let by_name = Handle::Filename(file.file_name().to_string());
        if self.seen.contains(&by_name) {
            return Some(by_name);
        }
        file.extensions()
            .map(|ext| Handle::Extension(ext.to_string()))
            .find(|handle| self.seen.contains(handle))
    }

    /// Removes every handle while keeping the history.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    /// Iterates active handles in order.
    pub fn handles(&self) -> impl Iterator<Item = (&Handle, &Registration)> {
        self.handles.iter()
    }
}
