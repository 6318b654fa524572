//! Structured diagnostics for the Kiln engine.
//!
//! Plugin conflicts, missing plugins, manifest mistakes and per-file compile
//! failures are all reported as [`Diagnostic`] values carrying a severity, a
//! category-prefixed [`DiagnosticCode`] and an optional file location. The
//! thread-safe [`DiagnosticSink`] collects them while compile workers run in
//! parallel, and a [`DiagnosticRenderer`] formats them for a terminal or as
//! JSON.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::{Diagnostic, Severity};
pub use renderer::{DiagnosticRenderer, JsonRenderer, TerminalRenderer};
pub use sink::DiagnosticSink;
