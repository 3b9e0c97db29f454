use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A location in source text.
///
/// `offset` counts characters from the start of the file, `line` and
/// `column` are 1-based. A `\r\n` pair advances the line once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// The position of the first character of a file.
    pub const fn start() -> Self {
        Self::new(0, 1, 1)
    }

    /// The position after consuming `ch`, where `next` is the character that follows it.
    pub fn advance(self, ch: char, next: Option<char>) -> Self {
        match ch {
            '\r' if next == Some('\n') => Self::new(self.offset + 1, self.line, self.column + 1),
            '\r' | '\n' => Self::new(self.offset + 1, self.line + 1, 1),
            _ => Self::new(self.offset + 1, self.line, self.column + 1),
        }
    }

    /// The position after consuming every character of `chars`.
    pub fn advance_over(self, chars: &[char]) -> Self {
        chars
            .iter()
            .enumerate()
            .fold(self, |pos, (i, ch)| pos.advance(*ch, chars.get(i + 1).copied()))
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

/// A span of source text in a named file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub file: Arc<str>,
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(file: Arc<str>, start: Position, end: Position) -> Self {
        Self { file, start, end }
    }

    /// A zero-width range anchored at `at`.
    pub fn empty(file: Arc<str>, at: Position) -> Self {
        Self::new(file, at, at)
    }

    pub fn is_empty(&self) -> bool {
        self.start.offset == self.end.offset
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.end.offset - self.start.offset
    }

    /// The range from the start of `self` to the end of `other`.
    pub fn to(&self, other: &Range) -> Range {
        Range::new(self.file.clone(), self.start, other.end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.line, self.start.column)
    }
}
