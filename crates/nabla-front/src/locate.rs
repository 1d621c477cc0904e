//! Mapping host-AST spans to IR source locations.

use nabla_diagnostics::{FileId, Location, Span};

/// Resolves the byte spans on host AST nodes to line/column [`Location`]s.
///
/// The translated source is usually an excerpt of a larger file starting at
/// some line other than 1, so the mapper compensates with `start_line` the
/// same way the source cache does for rendering.
#[derive(Debug)]
pub struct Locator {
    file_id: FileId,
    start_line: u32,
    line_starts: Vec<u32>,
}

impl Locator {
    /// Create a mapper for one source excerpt.
    pub fn new(file_id: FileId, source: &str, start_line: u32) -> Self {
        let mut line_starts = vec![0u32];
        for (i, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Locator {
            file_id,
            start_line: start_line.max(1),
            line_starts,
        }
    }

    /// Resolve a span's start to a location. Dummy spans have none.
    pub fn locate(&self, span: Span) -> Option<Location> {
        if span.is_dummy() {
            return None;
        }
        let offset = span.start;
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line = idx as u32 + self.start_line;
        let column = offset - self.line_starts[idx] + 1;
        Some(Location::new(self.file_id, line, column))
    }
}
