//! The translator's error type.

use nabla_diagnostics::{Diagnostic, DiagnosticCode, Location};
use thiserror::Error;

/// Everything the translator can reject.
///
/// Two kinds cover the whole front-end: strict name-resolution failures and
/// user-facing translation rejections. Rejections share one kind and are
/// distinguished by message text; any of them aborts the compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// A name was absent through the whole scope chain in a context that
    /// requires strict local resolution.
    #[error("undeclared variable: {name}")]
    UndeclaredVariable {
        name: String,
        location: Option<Location>,
    },

    /// A construct the translator does not accept.
    #[error("{message}")]
    Translation {
        message: String,
        location: Option<Location>,
    },
}

impl TranslateError {
    /// A translation rejection.
    pub fn translation(message: impl Into<String>, location: Option<Location>) -> Self {
        TranslateError::Translation {
            message: message.into(),
            location,
        }
    }

    /// A strict-resolution failure.
    pub fn undeclared(name: impl Into<String>, location: Option<Location>) -> Self {
        TranslateError::UndeclaredVariable {
            name: name.into(),
            location,
        }
    }

    /// The error's source position, if the offending node had one.
    pub fn location(&self) -> Option<Location> {
        match self {
            TranslateError::UndeclaredVariable { location, .. }
            | TranslateError::Translation { location, .. } => *location,
        }
    }

    /// Attach a location if none is present yet.
    pub fn at(mut self, loc: Option<Location>) -> Self {
        let slot = match &mut self {
            TranslateError::UndeclaredVariable { location, .. }
            | TranslateError::Translation { location, .. } => location,
        };
        if slot.is_none() {
            *slot = loc;
        }
        self
    }

    /// Convert into a renderable diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (code, message) = match self {
            TranslateError::UndeclaredVariable { .. } => {
                (DiagnosticCode::UndeclaredVariable, self.to_string())
            }
            TranslateError::Translation { message, .. } => {
                (DiagnosticCode::TranslationError, message.clone())
            }
        };
        Diagnostic::error(code, message).at(self.location())
    }
}

/// Result alias used throughout the translator.
pub type Result<T> = std::result::Result<T, TranslateError>;
