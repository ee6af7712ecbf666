//! Source location tracking
#![allow(dead_code)]

use serde::Serialize;

/// A span represents a range in the source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    /// Start offset (characters)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// File ID
    pub file_id: usize,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, file_id: usize) -> Self {
        Self { start, end, file_id }
    }

    /// Create a dummy span (builtins, tests)
    pub fn dummy() -> Self {
        Self { start: 0, end: 0, file_id: 0 }
    }

    /// Merge two spans
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            file_id: self.file_id,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::dummy()
    }
}

/// 1-based line and column of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

/// Maps character offsets back to line/column for diagnostics
pub struct LineIndex {
    /// Offset at which every line starts
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, c) in source.chars().enumerate() {
            if c == '\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_col(&self, offset: usize) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        LineCol {
            line: line as u32 + 1,
            column: (offset - self.line_starts[line]) as u32 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let merged = Span::new(4, 6, 0).merge(&Span::new(1, 3, 0));
        assert_eq!(merged, Span::new(1, 6, 0));
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn test_line_col() {
        let index = LineIndex::new("ab\ncd\n\nx");
        assert_eq!(index.line_col(0), LineCol { line: 1, column: 1 });
        assert_eq!(index.line_col(4), LineCol { line: 2, column: 2 });
        assert_eq!(index.line_col(6), LineCol { line: 3, column: 1 });
        assert_eq!(index.line_col(7), LineCol { line: 4, column: 1 });
    }
}
