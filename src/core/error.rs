//! PC-002: Positioned recipe errors and caret-annotated trace rendering.

use super::types::{floor_boundary, Position};
use std::io::{self, Write};
use thiserror::Error;

/// Category of a recipe error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Illegal character or unclosed string.
    Lex,
    /// Unexpected token.
    Parse,
    /// Name not bound in scope.
    Reference,
    /// Value used with a capability it lacks (calling a non-lambda, evaluating a lambda).
    Cast,
    /// Lambda called without a required parameter.
    Argument,
    /// Missing attribute.
    Attribute,
    /// Explicit `panic` expression.
    Panic,
    /// Build script failed or could not be spawned.
    Build,
    /// Filesystem failure.
    Io,
    /// Evaluation exceeded its depth or step limit.
    Limit,
}

/// An error at a source position, optionally wrapping the error that caused it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RecipeError {
    pub kind: ErrorKind,
    pub pos: Position,
    pub message: String,
    #[source]
    pub previous: Option<Box<RecipeError>>,
}

pub type RecipeResult<T> = Result<T, RecipeError>;

impl RecipeError {
    pub fn new(kind: ErrorKind, pos: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            pos,
            message: message.into(),
            previous: None,
        }
    }

    /// Wrap a foreign error (I/O, process) at `pos`, prefixing its message.
    pub fn foreign(
        kind: ErrorKind,
        pos: Position,
        message: &str,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::new(kind, pos, format!("{}: {}", message, err))
    }

    /// Push an outer frame. The kind of the root cause is kept.
    pub fn wrap(self, pos: &Position, message: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            pos: pos.clone(),
            message: message.into(),
            previous: Some(Box::new(self)),
        }
    }

    /// Frames from outermost to innermost.
    pub fn chain(&self) -> impl Iterator<Item = &RecipeError> {
        std::iter::successors(Some(self), |e| e.previous.as_deref())
    }

    /// The innermost cause.
    pub fn root(&self) -> &RecipeError {
        self.chain().last().unwrap_or(self)
    }
}

/// Write one excerpt per frame, outermost first, followed by `file:line:col: message`.
pub fn print_trace<W: Write>(writer: &mut W, err: &RecipeError) -> io::Result<()> {
    for frame in err.chain() {
        write_excerpt(writer, &frame.pos)?;
        let (line, col) = frame.pos.line_col();
        writeln!(
            writer,
            "{}:{}:{}: {}",
            frame.pos.file.filename, line, col, frame.message
        )?;
    }
    Ok(())
}

/// Render a trace into a string.
pub fn render_trace(err: &RecipeError) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = print_trace(&mut buf, err);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_excerpt<W: Write>(writer: &mut W, pos: &Position) -> io::Result<()> {
    let content = &pos.file.content;
    let mut line_start = 0;

    for (index, line) in content.split_inclusive('\n').enumerate() {
        let line_end = line_start + line.len();
        let number = index + 1;
        let text = line.trim_end_matches(['\n', '\r']);

        if line_end <= pos.start && !(pos.start == line_end && line_end == content.len()) {
            line_start = line_end;
            continue;
        }

        let single_line = pos.end <= line_start + text.len().max(1);
        if line_start <= pos.start && single_line {
            writeln!(writer, "{:3} | {}", number, text)?;
            let padding = text[..floor_boundary(text, pos.start - line_start)]
                .chars()
                .count();
            let width = pos.text().chars().count().max(1);
            writeln!(
                writer,
                "    | {}^{}",
                " ".repeat(padding),
                "-".repeat(width - 1)
            )?;
            return Ok(());
        }

        writeln!(writer, "{:3} |> {}", number, text)?;
        if pos.end <= line_end {
            return Ok(());
        }
        line_start = line_end;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SourceFile;

    #[test]
    fn test_pc002_wrap_keeps_root_kind() {
        let file = SourceFile::new("a.pc", "panic \"boom\"");
        let inner = RecipeError::new(ErrorKind::Panic, Position::new(&file, 0, 12), "boom");
        let outer = inner.wrap(&Position::new(&file, 0, 5), "while evaluating");
        assert_eq!(outer.kind, ErrorKind::Panic);
        assert_eq!(outer.root().message, "boom");
        assert_eq!(outer.chain().count(), 2);
    }

    #[test]
    fn test_pc002_trace_single_line_caret() {
        let file = SourceFile::new("a.pc", "{a=1, b=$c}\n");
        let err = RecipeError::new(
            ErrorKind::Reference,
            Position::new(&file, 8, 10),
            "`c` is not defined in current scope",
        );
        let trace = render_trace(&err);
        let lines: Vec<_> = trace.lines().collect();
        assert_eq!(lines[0], "  1 | {a=1, b=$c}");
        assert_eq!(lines[1], "    |         ^-");
        assert_eq!(lines[2], "a.pc:1:9: `c` is not defined in current scope");
    }

    #[test]
    fn test_pc002_trace_multi_line_markers() {
        let file = SourceFile::new("a.pc", "[\n  \"x\",\n]\n");
        let err = RecipeError::new(ErrorKind::Parse, Position::new(&file, 0, 10), "bad list");
        let trace = render_trace(&err);
        assert!(trace.contains("  1 |> ["));
        assert!(trace.contains("  2 |>   \"x\","));
        assert!(trace.contains("  3 |> ]"));
        assert!(trace.ends_with("a.pc:1:1: bad list\n"));
    }

    #[test]
    fn test_pc002_trace_outermost_first() {
        let file = SourceFile::new("a.pc", "panic \"boom\"");
        let inner = RecipeError::new(ErrorKind::Panic, Position::new(&file, 6, 12), "boom");
        let outer = inner.wrap(&Position::new(&file, 0, 12), "while evaluating panic");
        let trace = render_trace(&outer);
        let outer_at = trace.find("while evaluating panic").unwrap();
        let inner_at = trace.find(": boom").unwrap();
        assert!(outer_at < inner_at);
    }

    #[test]
    fn test_pc002_trace_unclosed_multibyte() {
        let file = SourceFile::new("a.pc", "\"\u{e9}");
        let err = RecipeError::new(ErrorKind::Lex, Position::new(&file, 1, 3), "unclosed string");
        let trace = render_trace(&err);
        let lines: Vec<_> = trace.lines().collect();
        assert_eq!(lines[0], "  1 | \"\u{e9}");
        assert_eq!(lines[1], "    |  ^");
        assert_eq!(lines[2], "a.pc:1:2: unclosed string");
    }

    #[test]
    fn test_pc002_caret_counts_chars() {
        let file = SourceFile::new("a.pc", "{\u{4e2d} = $\u{fc}x}");
        let err = RecipeError::new(ErrorKind::Reference, Position::new(&file, 7, 11), "bad");
        let lines: Vec<_> = render_trace(&err).lines().map(str::to_string).collect();
        assert_eq!(lines[1], "    |      ^--");
        assert_eq!(lines[2], "a.pc:1:6: bad");
    }

    #[test]
    fn test_pc002_trace_at_eof() {
        let file = SourceFile::new("a.pc", "\"open");
        let err = RecipeError::new(ErrorKind::Lex, Position::new(&file, 4, 5), "unclosed string");
        let trace = render_trace(&err);
        assert!(trace.contains("  1 | \"open"));
        assert!(trace.contains("a.pc:1:5: unclosed string"));
    }
}
