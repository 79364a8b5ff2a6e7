//! PC-001: Shared types for source files, positions, tokens and build events.
//!
//! Positions point into an immutable [`SourceFile`] shared by every token and
//! node parsed from it. Build events are serialized into the cache's JSONL log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Source positions
// ============================================================================

/// A recipe file: its name and full text. Never mutated after parsing.
#[derive(Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub filename: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            filename: filename.into(),
            content: content.into(),
        })
    }
}

/// A byte range inside a source file.
#[derive(Debug, Clone)]
pub struct Position {
    pub file: Rc<SourceFile>,
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn new(file: &Rc<SourceFile>, start: usize, end: usize) -> Self {
        Self {
            file: Rc::clone(file),
            start,
            end,
        }
    }

    /// Position for values synthesized during evaluation (e.g. `out`).
    pub fn synthetic(content: &str) -> Self {
        let file = SourceFile::new("<eval>", content);
        let end = file.content.len();
        Self { file, start: 0, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Span from the start of `self` to the end of `other`.
    pub fn stretch(&self, other: &Position) -> Position {
        Position {
            file: Rc::clone(&self.file),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Text covered by this position.
    pub fn text(&self) -> &str {
        let content = &self.file.content;
        let end = floor_boundary(content, self.end);
        &content[floor_boundary(content, self.start).min(end)..end]
    }

    /// 1-based line and column (in chars) of the start offset.
    pub fn line_col(&self) -> (usize, usize) {
        let content = &self.file.content;
        let before = &content[..floor_boundary(content, self.start)];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        (line, before[line_start..].chars().count() + 1)
    }
}

/// Largest char boundary of `s` at or before `index`.
pub fn floor_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.line_col();
        write!(f, "{}:{}:{}", self.file.filename, line, col)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Token names produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    InterpBegin,
    InterpEnd,
    Path,
    Arrow,
    Symbol,
    StringBegin,
    StringEnd,
    MultilineBegin,
    MultilineEnd,
    Keyword,
    Number,
    Ident,
    Char,
    Comment,
    Space,
    Eof,
    Illegal,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InterpBegin => "interp-begin",
            Self::InterpEnd => "interp-end",
            Self::Path => "path",
            Self::Arrow => "arrow",
            Self::Symbol => "symbol",
            Self::StringBegin => "string-begin",
            Self::StringEnd => "string-end",
            Self::MultilineBegin => "multiline-begin",
            Self::MultilineEnd => "multiline-end",
            Self::Keyword => "keyword",
            Self::Number => "number",
            Self::Ident => "ident",
            Self::Char => "char",
            Self::Comment => "comment",
            Self::Space => "space",
            Self::Eof => "eof",
            Self::Illegal => "illegal",
        };
        write!(f, "{}", name)
    }
}

/// A positioned token. For `illegal` tokens the content is the diagnostic.
#[derive(Debug, Clone)]
pub struct Token {
    pub pos: Position,
    pub kind: TokenKind,
    pub content: String,
}

// ============================================================================
// Build events
// ============================================================================

/// An event in the build log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted {
        key: String,
        path: String,
        source: String,
    },
    BuildReused {
        key: String,
        path: String,
    },
    BuildCompleted {
        key: String,
        path: String,
        duration_seconds: f64,
        #[serde(default)]
        content_hash: Option<String>,
    },
    BuildFailed {
        key: String,
        path: String,
        error: String,
    },
}

/// A build event with its timestamp, one line in `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BuildEvent,
}
