//! Lexical source positions shared by the lexer, parser, and validator.
//!
//! This is the position type attached to every AST node so that parse and
//! validation errors can be reported exactly at the offending site. It is
//! deliberately separate from [`crate::trace::Span`], which models a
//! tracing span (an operation record in a trace) rather than a span of
//! source text.

use std::{cmp::Ordering, fmt};

/// A range of source text, given as absolute char offsets into the
/// original rule expression.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Span {
    /// The start of the range.
    pub start: Position,
    /// The end of the range.
    pub end: Position,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({:?}, {:?})", self.start, self.end)
    }
}

impl Ord for Span {
    fn cmp(&self, other: &Span) -> Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

impl PartialOrd for Span {
    fn partial_cmp(&self, other: &Span) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single position within a rule expression: absolute char offset, line
/// number, and column number.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Position {
    /// Absolute offset from the start of the expression, starting at `0`.
    pub offset: usize,
    /// Line number, starting at `1`.
    pub line: usize,
    /// Column number, starting at `1`.
    pub column: usize,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position(o: {:?}, l: {:?}, c: {:?})", self.offset, self.line, self.column)
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Position) -> Ordering {
        self.offset.cmp(&other.offset)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Position) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Span {
    /// Creates a new span between the two given positions.
    #[must_use]
    pub fn new(start: Position, end: Position) -> Span {
        Span { start, end }
    }

    /// Creates a zero-width span at a single position.
    #[must_use]
    pub fn splat(pos: Position) -> Span {
        Span::new(pos, pos)
    }

    /// Returns a copy of this span with the start position replaced.
    #[must_use]
    pub fn with_start(self, pos: Position) -> Span {
        Span { start: pos, ..self }
    }

    /// Returns a copy of this span with the end position replaced.
    #[must_use]
    pub fn with_end(self, pos: Position) -> Span {
        Span { end: pos, ..self }
    }

    /// True if this span covers no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub fn new(offset: usize, line: usize, column: usize) -> Position {
        Position { offset, line, column }
    }
}
