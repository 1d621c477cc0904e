//! Diagnostic types for front-end errors.

use crate::span::Location;
use serde::{Deserialize, Serialize};

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Warning (translation continues)
    Warning,
    /// Error (aborts the compilation unit)
    Error,
}

impl Severity {
    /// String representation for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic codes for the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Name absent through the whole scope chain where strict resolution is required
    UndeclaredVariable,
    /// Any user-facing rejection by the translator (one code, many messages)
    TranslationError,
    /// Structured error from the inference layer
    InferenceError,
    /// Internal front-end invariant violation
    InternalError,
}

impl DiagnosticCode {
    /// The code string (e.g. "T001").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UndeclaredVariable => "T001",
            Self::TranslationError => "T002",
            Self::InferenceError => "I001",
            Self::InternalError => "X001",
        }
    }

    /// Human-readable kind name, used as the message prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UndeclaredVariable => "UndeclaredVariable",
            Self::TranslationError => "TranslationError",
            Self::InferenceError => "InferenceError",
            Self::InternalError => "InternalError",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A front-end diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Error code
    pub code: DiagnosticCode,
    /// Severity level
    pub severity: Severity,
    /// Single-line message
    pub message: String,
    /// Where the problem is, if the offending node had a source position
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            location: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message: message.into(),
            location: None,
        }
    }

    /// Attach a location.
    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    /// Check if this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// All diagnostics, in emission order
    pub items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Add a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.is_error())
    }

    /// Count errors.
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate over diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
