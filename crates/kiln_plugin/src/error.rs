//! Errors reported by the plugin engine.
//!
//! Everything except [`PluginError::Compile`] is structural: it is detected
//! before any compilation starts and blocks the whole cycle. Compile errors
//! are scoped to one file and never abort unrelated files.

use std::fmt;

use kiln_common::PackageId;
use kiln_diagnostics::{code, Diagnostic};

use crate::registry::Handle;

/// A compiler failed on one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileError {
    /// Path of the failing file.
    pub file: String,
    /// 1-based line, when the compiler knows it.
    pub line: Option<u32>,
    /// What went wrong.
    pub message: String,
}

impl CompileError {
    /// Creates a compile error without a line.
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            message: message.into(),
        }
    }

    /// Attaches a line number.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Converts to an `E110` diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(code::E110, self.message.clone())
            .in_file(self.file.clone())
            .at_line(self.line)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}: {}", self.file, self.message),
            None => write!(f, "{}: {}", self.file, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Which kind of declaration was repeated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclarationRole {
    /// A file added as a processed source.
    Source,
    /// A file added as a static asset.
    Asset,
}

impl fmt::Display for DeclarationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationRole::Source => f.write_str("source"),
            DeclarationRole::Asset => f.write_str("asset"),
        }
    }
}

/// Why no plugin handles a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MissingPluginReason {
    /// No plugin has ever handled the file's extension.
    NeverSupported,
    /// A plugin handled `handle` when the package was built or published, or
    /// earlier in this process, but none does now.
    NoLongerSupported {
        /// The extension or file name that used to be handled.
        handle: Handle,
    },
}

/// Errors raised while registering plugins, classifying package files or
/// compiling.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// Two packages registered the same extension or file name.
    #[error(
        "conflict: two packages included in the app ({first} and {second}) are both trying to handle {handle}"
    )]
    Conflict {
        /// The contested handle.
        handle: Handle,
        /// The package that registered it first.
        first: PackageId,
        /// The package that tried to register it again.
        second: PackageId,
    },

    /// A source file has no plugin.
    #[error("{}", missing_plugin_message(.file, .package, .reason))]
    MissingPlugin {
        /// Path of the file.
        file: String,
        /// Package that declared it.
        package: PackageId,
        /// Whether a plugin used to exist.
        reason: MissingPluginReason,
    },

    /// A file was added twice in the same role.
    #[error("Duplicate {role} file in package {package}: {path}")]
    DuplicateDeclaration {
        /// The repeated role.
        role: DeclarationRole,
        /// Package being described.
        package: PackageId,
        /// Path of the file.
        path: String,
    },

    /// An asset was declared without target environments.
    #[error(
        "add_assets for {path} in package {package} requires a second argument listing the environments to serve it to"
    )]
    MissingArgument {
        /// Package being described.
        package: PackageId,
        /// Path of the asset.
        path: String,
    },

    /// A plugin's initialization routine failed.
    #[error("While initializing compiler plugin in package {package}: {location}: {message}")]
    PluginInitialization {
        /// Package that defines the plugin.
        package: PackageId,
        /// Where the plugin is defined.
        location: String,
        /// The failure reported by the plugin.
        message: String,
    },

    /// A file failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

fn missing_plugin_message(file: &str, package: &PackageId, reason: &MissingPluginReason) -> String {
    let name = file.rsplit('/').next().unwrap_or(file);
    match reason {
        MissingPluginReason::NeverSupported => {
            format!("no plugin known to handle {name} in {package}")
        }
        MissingPluginReason::NoLongerSupported { handle } => format!(
            "no plugin found for {name} in {package}; a plugin for {handle} was active when it was published but none is now"
        ),
    }
}

impl PluginError {
    /// Returns `true` for errors that block a cycle before compilation.
    pub fn is_structural(&self) -> bool {
        !matches!(self, PluginError::Compile(_))
    }

    /// Converts to a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PluginError::Conflict { .. } => Diagnostic::error(code::E100, self.to_string())
                .with_help("remove one of the packages or change one registration"),
            PluginError::MissingPlugin { file, .. } => {
                Diagnostic::error(code::E101, self.to_string()).in_file(file.clone())
            }
            PluginError::PluginInitialization { location, .. } => {
                Diagnostic::error(code::E102, self.to_string()).with_note(format!("defined at {location}"))
            }
            PluginError::DuplicateDeclaration { role, path, .. } => {
                let code = match role {
                    DeclarationRole::Source => code::E103,
                    DeclarationRole::Asset => code::E104,
                };
                Diagnostic::error(code, self.to_string()).in_file(path.clone())
            }
            PluginError::MissingArgument { path, .. } => {
                Diagnostic::error(code::E105, self.to_string()).in_file(path.clone())
            }
            PluginError::Compile(err) => err.to_diagnostic(),
        }
    }
}
