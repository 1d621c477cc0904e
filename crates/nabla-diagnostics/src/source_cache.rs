//! Source excerpt cache for diagnostic rendering.
//!
//! Translated code is usually an excerpt of a larger file (a single function
//! body), so every cached source carries the line at which it starts in the
//! original file. Resolved locations always use original-file line numbers.

use crate::span::{FileId, Location, Span};

/// A cached source excerpt with line information.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Unique identifier
    pub id: FileId,
    /// Path of the original file, for display
    pub path: String,
    /// The excerpt's text
    pub source: String,
    /// Line of the original file at which the excerpt starts (1-indexed)
    pub start_line: u32,
    /// Byte offsets where each excerpt line starts
    line_starts: Vec<u32>,
}

impl SourceFile {
    fn new(id: FileId, path: String, source: String, start_line: u32) -> Self {
        let line_starts = compute_line_starts(&source);
        Self {
            id,
            path,
            source,
            start_line: start_line.max(1),
            line_starts,
        }
    }

    /// Resolve a byte offset to an original-file (line, column), both 1-indexed.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source.len() as u32);
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let line = idx as u32 + self.start_line;
        let column = offset - self.line_starts[idx] + 1;
        (line, column)
    }

    /// Get the text of an original-file line, without its trailing newline.
    /// Returns `None` for lines outside the excerpt.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line < self.start_line {
            return None;
        }
        let idx = (line - self.start_line) as usize;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&e| e as usize)
            .unwrap_or(self.source.len());
        Some(self.source[start..end].trim_end_matches('\n').trim_end_matches('\r'))
    }

    /// Number of lines in the excerpt.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

fn compute_line_starts(source: &str) -> Vec<u32> {
    let mut starts = vec![0];
    for (i, c) in source.char_indices() {
        if c == '\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

/// Cache of source excerpts, indexed by [`FileId`].
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

impl SourceCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Add an excerpt starting at `start_line` of `path`, returning its id.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        source: String,
        start_line: u32,
    ) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path.into(), source, start_line));
        id
    }

    /// Get a cached excerpt by id.
    pub fn get_file(&self, id: FileId) -> Option<&SourceFile> {
        if id == FileId::DUMMY {
            return None;
        }
        self.files.get(id.0 as usize)
    }

    /// Resolve a span to a location in the original file.
    pub fn location(&self, span: Span) -> Option<Location> {
        let file = self.get_file(span.file_id)?;
        let (line, column) = file.line_column(span.start);
        Some(Location::new(file.id, line, column))
    }

    /// Get the original-file line text a location points at.
    pub fn line_text(&self, loc: Location) -> Option<&str> {
        self.get_file(loc.source)?.line_text(loc.line)
    }

    /// Display path for a source id.
    pub fn path(&self, id: FileId) -> Option<&str> {
        self.get_file(id).map(|f| f.path.as_str())
    }

    /// Number of cached excerpts.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_starts_at_newlines() {
        let starts = compute_line_starts("a\nbc\nd");
        assert_eq!(starts, vec![0, 2, 5]);
    }

    #[test]
    fn line_column_compensates_start_line() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("m.src", "def f(x):\n    y = x\n".to_string(), 10);
        let file = cache.get_file(id).unwrap();

        assert_eq!(file.line_column(0), (10, 1));
        // 'y' on the second excerpt line
        assert_eq!(file.line_column(14), (11, 5));
    }

    #[test]
    fn line_text_uses_original_numbering() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("m.src", "first\nsecond".to_string(), 3);
        let file = cache.get_file(id).unwrap();

        assert_eq!(file.line_text(3), Some("first"));
        assert_eq!(file.line_text(4), Some("second"));
        assert_eq!(file.line_text(2), None);
        assert_eq!(file.line_text(5), None);
    }

    #[test]
    fn location_roundtrip() {
        let mut cache = SourceCache::new();
        let id = cache.add_file("m.src", "x = 1\ny = 2\n".to_string(), 1);

        let loc = cache.location(Span::new(id, 6, 7)).unwrap();
        assert_eq!((loc.line, loc.column), (2, 1));
        assert_eq!(cache.line_text(loc), Some("y = 2"));
    }

    #[test]
    fn dummy_span_has_no_location() {
        let cache = SourceCache::new();
        assert!(cache.location(Span::DUMMY).is_none());
    }
}
