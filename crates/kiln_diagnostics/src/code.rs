//! Diagnostic codes with category prefixes.
//!
//! Codes `E100`--`E110` cover plugin registration, manifest and compile
//! failures. `W100` covers cache persistence problems, which never fail a
//! build.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Error diagnostics, prefixed with `E`.
    Error,
    /// Warning diagnostics, prefixed with `W`.
    Warning,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Error => 'E',
            Category::Warning => 'W',
        }
    }
}

/// A structured diagnostic code: category prefix plus a 3-digit number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

/// Two packages register a compiler for the same extension.
pub const E100: DiagnosticCode = DiagnosticCode::new(Category::Error, 100);

/// A source file has no plugin able to compile it.
pub const E101: DiagnosticCode = DiagnosticCode::new(Category::Error, 101);

/// A plugin's initialization routine failed.
pub const E102: DiagnosticCode = DiagnosticCode::new(Category::Error, 102);

/// A file is declared as source more than once in one package.
pub const E103: DiagnosticCode = DiagnosticCode::new(Category::Error, 103);

/// A file is declared as asset more than once in one package.
pub const E104: DiagnosticCode = DiagnosticCode::new(Category::Error, 104);

/// A declaration is missing a required argument.
pub const E105: DiagnosticCode = DiagnosticCode::new(Category::Error, 105);

/// A file failed to compile.
pub const E110: DiagnosticCode = DiagnosticCode::new(Category::Error, 110);

/// A cache entry could not be persisted.
pub const W100: DiagnosticCode = DiagnosticCode::new(Category::Warning, 100);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_prefixes() {
        assert_eq!(Category::Error.prefix(), 'E');
        assert_eq!(Category::Warning.prefix(), 'W');
    }

    #[test]
    fn display_format() {
        assert_eq!(format!("{E100}"), "E100");
        assert_eq!(format!("{W100}"), "W100");
        assert_eq!(format!("{}", DiagnosticCode::new(Category::Error, 7)), "E007");
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&E110).unwrap();
        let back: DiagnosticCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, E110);
    }
}
