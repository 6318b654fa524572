//! Structured diagnostic messages with severity, code and file location.

use crate::code::DiagnosticCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity level of a diagnostic, ordered from least to most severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
    /// An informational note.
    Note,
    /// A problem that does not block the build.
    Warning,
    /// A problem that blocks the build.
    Error,
}

impl Severity {
    /// Returns `true` if this severity is [`Error`](Severity::Error).
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic reported to the build orchestrator.
///
/// The location is optional: structural problems such as an extension
/// conflict have no file, while compile failures name the offending file
/// and, when the plugin knows it, the line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// The file this diagnostic is about, if any.
    pub file: Option<String>,
    /// 1-based line within `file`, if known.
    pub line: Option<u32>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
    /// Actionable suggestions.
    pub help: Vec<String>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            file: None,
            line: None,
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Attaches a file location.
    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attaches a line number; meaningful only together with a file.
    pub fn at_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Adds a help message to this diagnostic.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Returns `file:line`, `file`, or `None` when there is no location.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        Some(match self.line {
            Some(line) => format!("{file}:{line}"),
            None => file.clone(),
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(loc) => write!(f, "{loc}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{E101, E110, W100};

    #[test]
    fn severity_ordering() {
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error.is_error());
        assert!(!Severity::Warning.is_error());
    }

    #[test]
    fn create_error() {
        let diag = Diagnostic::error(E101, "no plugin found");
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "no plugin found");
        assert!(diag.location().is_none());
        assert_eq!(diag.to_string(), "no plugin found");
    }

    #[test]
    fn create_warning() {
        let diag = Diagnostic::warning(W100, "cache write failed");
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn location_with_line() {
        let diag = Diagnostic::error(E110, "Unknown import: /foo/bad.less")
            .in_file("bad-import.less")
            .at_line(Some(1));
        assert_eq!(diag.location().as_deref(), Some("bad-import.less:1"));
        assert_eq!(
            diag.to_string(),
            "bad-import.less:1: Unknown import: /foo/bad.less"
        );
    }

    #[test]
    fn location_without_line() {
        let diag = Diagnostic::error(E110, "boom").in_file("a.styl").at_line(None);
        assert_eq!(diag.to_string(), "a.styl: boom");
    }

    #[test]
    fn builder_methods() {
        let diag = Diagnostic::error(E101, "missing")
            .with_note("the package was built with a plugin")
            .with_help("add the plugin package back");
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.help.len(), 1);
    }
}
