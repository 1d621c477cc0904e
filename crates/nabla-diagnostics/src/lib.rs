//! Diagnostic infrastructure for the nabla front-end.
//!
//! Provides source spans, a cache of source excerpts that resolves spans to
//! line/column locations, and emitters that render diagnostics to a terminal,
//! as plain text, or as JSON.

pub mod diagnostic;
pub mod emitter;
pub mod source_cache;
pub mod span;

pub use diagnostic::{Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use emitter::{DiagnosticEmitter, JsonEmitter, SimpleEmitter, TerminalEmitter};
pub use source_cache::{SourceCache, SourceFile};
pub use span::{FileId, Location, Span};
