//! Diagnostic emitters for different output formats.

use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::source_cache::SourceCache;
use std::io::Write;

/// Trait for emitting diagnostics in various formats.
pub trait DiagnosticEmitter {
    /// Emit a single diagnostic.
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()>;

    /// Emit multiple diagnostics.
    fn emit_all(&mut self, diagnostics: &Diagnostics, cache: &SourceCache) -> std::io::Result<()> {
        for diag in diagnostics.iter() {
            self.emit(diag, cache)?;
        }
        Ok(())
    }
}

/// Rich terminal output: kind, message, and a source excerpt with a caret
/// under the offending column when a location is available.
pub struct TerminalEmitter<W: Write> {
    writer: W,
    colored: bool,
}

impl<W: Write> TerminalEmitter<W> {
    /// Create a new terminal emitter.
    pub fn new(writer: W, colored: bool) -> Self {
        Self { writer, colored }
    }

    fn color(&self, diagnostic: &Diagnostic) -> &'static str {
        if !self.colored {
            return "";
        }
        if diagnostic.is_error() {
            "\x1b[31m"
        } else {
            "\x1b[33m"
        }
    }

    fn reset(&self) -> &'static str {
        if self.colored {
            "\x1b[0m"
        } else {
            ""
        }
    }

    fn cyan(&self) -> &'static str {
        if self.colored {
            "\x1b[36m"
        } else {
            ""
        }
    }
}

impl<W: Write> DiagnosticEmitter for TerminalEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let color = self.color(diagnostic);
        let reset = self.reset();
        let cyan = self.cyan();

        // Header: Kind: message
        writeln!(
            self.writer,
            "{}{}{}: {}",
            color,
            diagnostic.code.kind(),
            reset,
            diagnostic.message
        )?;

        if let Some(loc) = diagnostic.location {
            let path = cache.path(loc.source).unwrap_or("<unknown>");
            writeln!(
                self.writer,
                "  {}-->{} {}:{}:{}",
                cyan, reset, path, loc.line, loc.column
            )?;

            if let Some(line_text) = cache.line_text(loc) {
                let line_str = loc.line.to_string();
                let pad = " ".repeat(line_str.len());
                writeln!(self.writer, "{} {}|{}", pad, cyan, reset)?;
                writeln!(self.writer, "{}{} |{} {}", cyan, line_str, reset, line_text)?;
                let caret_pad = " ".repeat(loc.column.saturating_sub(1) as usize);
                writeln!(
                    self.writer,
                    "{} {}|{} {}{}^{}",
                    pad, cyan, reset, caret_pad, color, reset
                )?;
            }
        }

        writeln!(self.writer)?;
        Ok(())
    }
}

/// Simple one-line-per-diagnostic text output.
pub struct SimpleEmitter<W: Write> {
    writer: W,
}

impl<W: Write> SimpleEmitter<W> {
    /// Create a new simple emitter.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for SimpleEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        match diagnostic.location {
            Some(loc) => writeln!(
                self.writer,
                "{}:{}:{}: {}: {} [{}]",
                cache.path(loc.source).unwrap_or("<unknown>"),
                loc.line,
                loc.column,
                diagnostic.code.kind(),
                diagnostic.message,
                diagnostic.code.as_str()
            ),
            None => writeln!(
                self.writer,
                "{}: {} [{}]",
                diagnostic.code.kind(),
                diagnostic.message,
                diagnostic.code.as_str()
            ),
        }
    }
}

/// JSON output for tooling integration.
pub struct JsonEmitter<W: Write> {
    writer: W,
}

impl<W: Write> JsonEmitter<W> {
    /// Create a new JSON emitter.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> DiagnosticEmitter for JsonEmitter<W> {
    fn emit(&mut self, diagnostic: &Diagnostic, cache: &SourceCache) -> std::io::Result<()> {
        let json = serde_json::json!({
            "code": diagnostic.code.as_str(),
            "kind": diagnostic.code.kind(),
            "severity": diagnostic.severity.as_str(),
            "message": diagnostic.message,
            "location": diagnostic.location.map(|l| serde_json::json!({
                "file": cache.path(l.source),
                "line": l.line,
                "column": l.column,
            })),
        });
        serde_json::to_writer(&mut self.writer, &json)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;
    use crate::span::Span;

    fn sample_cache() -> (SourceCache, crate::span::Location) {
        let mut cache = SourceCache::new();
        let id = cache.add_file("m.src", "a = b + 1\n".to_string(), 7);
        let loc = cache.location(Span::new(id, 4, 5)).unwrap();
        (cache, loc)
    }

    #[test]
    fn terminal_renders_excerpt_and_caret() {
        let (cache, loc) = sample_cache();
        let diag = Diagnostic::error(DiagnosticCode::UndeclaredVariable, "undeclared variable: b")
            .at(Some(loc));

        let mut out = Vec::new();
        TerminalEmitter::new(&mut out, false).emit(&diag, &cache).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("UndeclaredVariable: undeclared variable: b"));
        assert!(text.contains("m.src:7:5"));
        assert!(text.contains("a = b + 1"));
        assert!(text.contains("    ^"));
    }

    #[test]
    fn simple_emitter_without_location() {
        let cache = SourceCache::new();
        let diag = Diagnostic::error(DiagnosticCode::TranslationError, "missing return statement");

        let mut out = Vec::new();
        SimpleEmitter::new(&mut out).emit(&diag, &cache).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text, "TranslationError: missing return statement [T002]\n");
    }

    #[test]
    fn json_emitter_includes_location() {
        let (cache, loc) = sample_cache();
        let diag = Diagnostic::error(DiagnosticCode::TranslationError, "keyword arguments are not allowed")
            .at(Some(loc));

        let mut out = Vec::new();
        JsonEmitter::new(&mut out).emit(&diag, &cache).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["code"], "T002");
        assert_eq!(value["location"]["line"], 7);
    }
}
