//! Source location tracking for diagnostics.
//!
//! Provides [`Span`] to track where declarations, expressions and
//! diagnostics occur in script source.

use std::fmt;

/// A span of source code.
///
/// Tracks the line:column where a node starts, its length on that line, and
/// the last line it covers so statement ranges can be marked as unsafe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, byte-based).
    pub col: u32,
    /// Length in bytes on the starting line.
    pub len: u32,
    /// Last line covered by the node (inclusive).
    pub end_line: u32,
}

impl Span {
    /// Create a new single-line span from a line, column, and length.
    #[inline]
    pub fn new(line: u32, col: u32, len: u32) -> Self {
        Self {
            line,
            col,
            len,
            end_line: line,
        }
    }

    /// Create a zero-length span at a position.
    #[inline]
    pub fn point(line: u32, col: u32) -> Self {
        Self::new(line, col, 0)
    }

    /// Create a span covering whole lines, used for statements and blocks.
    #[inline]
    pub fn lines(start: u32, end: u32) -> Self {
        Self {
            line: start,
            col: 1,
            len: 0,
            end_line: end.max(start),
        }
    }

    /// Whether this span is empty (zero length).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The length of this span in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Iterate over every line the span touches.
    pub fn line_range(&self) -> impl Iterator<Item = u32> {
        self.line..=self.end_line.max(self.line)
    }

    /// Merge two spans into one that starts at the earlier one and covers both.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        let (first, second) = if (other.line, other.col) < (self.line, self.col) {
            (other, self)
        } else {
            (self, other)
        };
        let end_line = first.end_line.max(second.end_line);
        if first.line == second.line {
            let end_col = (second.col + second.len).max(first.col + first.len);
            Span {
                line: first.line,
                col: first.col,
                len: end_col - first.col,
                end_line,
            }
        } else {
            Span {
                line: first.line,
                col: first.col,
                len: first.len,
                end_line,
            }
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let span = Span::new(1, 5, 10);
        assert_eq!(span.len(), 10);
        assert!(!span.is_empty());
        assert_eq!(span.end_line, 1);

        let empty = Span::point(1, 5);
        assert!(empty.is_empty());
    }

    #[test]
    fn span_display() {
        let span = Span::new(3, 15, 5);
        assert_eq!(format!("{}", span), "3:15");
    }

    #[test]
    fn span_merge_same_line() {
        let span1 = Span::new(1, 5, 3);
        let span2 = Span::new(1, 10, 3);
        let merged = span1.merge(span2);

        assert_eq!(merged.line, 1);
        assert_eq!(merged.col, 5);
        assert_eq!(merged.len, 8);
    }

    #[test]
    fn span_merge_is_order_independent() {
        let a = Span::new(2, 1, 4);
        let b = Span::new(5, 3, 2);
        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(b).end_line, 5);
    }

    #[test]
    fn line_range_covers_statement() {
        let span = Span::lines(4, 6);
        assert_eq!(span.line_range().collect::<Vec<_>>(), vec![4, 5, 6]);
    }
}
