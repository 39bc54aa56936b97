//! Source coordinates and the byte-offset → (line, column) index.

/// A span over the token stream, carried by every AST and type-definition
/// node for diagnostic reporting (§3 "Coordinates").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinates {
    pub left_token: u32,
    pub right_token: u32,
}

impl Coordinates {
    #[must_use]
    pub fn new(left_token: u32, right_token: u32) -> Self {
        debug_assert!(left_token <= right_token);
        Coordinates { left_token, right_token }
    }

    /// Coordinates spanning just one token.
    #[must_use]
    pub fn single(token: u32) -> Self {
        Coordinates { left_token: token, right_token: token }
    }

    /// The smallest span covering both `self` and `other`.
    #[must_use]
    pub fn join(self, other: Coordinates) -> Self {
        Coordinates {
            left_token: self.left_token.min(other.left_token),
            right_token: self.right_token.max(other.right_token),
        }
    }

    /// A placeholder span for IR-internal nodes with no direct source
    /// origin (e.g. synthesized exit-block terminators).
    #[must_use]
    pub fn synthetic() -> Self {
        Coordinates { left_token: 0, right_token: 0 }
    }
}

/// A resolved line/column pair, 1-based as is conventional for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

/// Maps a byte offset in the original source file to `(line, column)`.
///
/// Built once from the raw source text; `line_starts[i]` is the byte offset
/// of the first character of line `i` (0-based internally, rendered 1-based).
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((offset + 1) as u32);
            }
        }
        LineIndex { line_starts }
    }

    /// Resolve a byte offset to a 1-based `(line, column)` pair.
    #[must_use]
    pub fn resolve(&self, offset: u32) -> LineColumn {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[line];
        LineColumn { line: line as u32 + 1, column: offset - line_start + 1 }
    }

    /// The source text of one (1-based) line, for `verbose` diagnostic
    /// rendering; `None` if `line` is out of range.
    #[must_use]
    pub fn line_span(&self, line: u32, source: &str) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)? as usize;
        let end = self
            .line_starts
            .get(idx + 1)
            .map_or(source.len(), |&e| e as usize)
            .min(source.len());
        source.get(start..end).map(|s| s.trim_end_matches(['\n', '\r']))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_first_line() {
        let idx = LineIndex::new("abc\ndef\nghi");
        assert_eq!(idx.resolve(0), LineColumn { line: 1, column: 1 });
        assert_eq!(idx.resolve(2), LineColumn { line: 1, column: 3 });
    }

    #[test]
    fn resolves_subsequent_lines() {
        let idx = LineIndex::new("abc\ndef\nghi");
        assert_eq!(idx.resolve(4), LineColumn { line: 2, column: 1 });
        assert_eq!(idx.resolve(8), LineColumn { line: 3, column: 1 });
    }

    #[test]
    fn line_span_trims_newline() {
        let src = "foo\nbar\n";
        let idx = LineIndex::new(src);
        assert_eq!(idx.line_span(1, src), Some("foo"));
        assert_eq!(idx.line_span(2, src), Some("bar"));
    }
}
