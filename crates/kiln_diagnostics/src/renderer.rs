//! Diagnostic rendering backends for terminal and machine-readable output.

use crate::diagnostic::Diagnostic;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a compact rustc-like terminal format.
///
/// ```text
/// error[E110]: Unknown import: /foo/bad.less
///   --> bad-import.less:1
///    = help: check the import path
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint_severity(&self, diag: &Diagnostic) -> String {
        if !self.color {
            return diag.severity.to_string();
        }
        let ansi = if diag.severity.is_error() { "31" } else { "33" };
        format!("\x1b[1;{ansi}m{}\x1b[0m", diag.severity)
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = format!(
            "{}[{}]: {}\n",
            self.paint_severity(diag),
            diag.code,
            diag.message
        );
        if let Some(loc) = diag.location() {
            out.push_str(&format!("  --> {loc}\n"));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }
        out
    }
}

/// Renders each diagnostic as a single JSON object line.
pub struct JsonRenderer;

impl DiagnosticRenderer for JsonRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let value = serde_json::json!({
            "severity": diag.severity.to_string(),
            "code": diag.code.to_string(),
            "message": diag.message,
            "file": diag.file,
            "line": diag.line,
            "notes": diag.notes,
            "help": diag.help,
        });
        format!("{value}\n")
    }
}
