//! PC-003: Table-driven lexer with a state stack.
//!
//! Rules are tried in table order; only rules belonging to the state on top
//! of the stack are considered, and the first match wins. Strings push a
//! `string` state, `{{` inside a string pushes `interp` so the spliced
//! expression is lexed as ordinary code, and `}}` pops back.

use super::types::{Position, SourceFile, Token, TokenKind};
use regex::Regex;
use std::rc::Rc;
use std::sync::LazyLock;

/// Lexer state; the top of the stack selects which rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    Root,
    Interp,
    String,
    Multiline,
}

impl LexState {
    fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Interp => "interpolation",
            Self::String => "string",
            Self::Multiline => "multiline-string",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Keep,
    Push(LexState),
    Pop,
}

struct Rule {
    states: &'static [LexState],
    kind: TokenKind,
    transition: Transition,
    skip: bool,
    pattern: Regex,
}

const CODE: &[LexState] = &[LexState::Root, LexState::Interp];
const INTERP: &[LexState] = &[LexState::Interp];
const STRING: &[LexState] = &[LexState::String];
const MULTI: &[LexState] = &[LexState::Multiline];

fn rule(
    states: &'static [LexState],
    kind: TokenKind,
    transition: Transition,
    skip: bool,
    expr: &str,
) -> Rule {
    Rule {
        states,
        kind,
        transition,
        skip,
        pattern: Regex::new(&format!("^(?:{})", expr)).expect("lexer pattern must compile"),
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use LexState::*;
    use Transition::*;
    vec![
        rule(INTERP, TokenKind::InterpEnd, Pop, false, r"\}\}"),
        rule(CODE, TokenKind::Path, Keep, false, r"\.?/[a-zA-Z0-9._-]*"),
        rule(CODE, TokenKind::Arrow, Keep, false, r"->"),
        rule(CODE, TokenKind::Symbol, Keep, false, r"[(){}\[\].=,$]"),
        rule(CODE, TokenKind::MultilineBegin, Push(Multiline), false, r"''"),
        rule(CODE, TokenKind::StringBegin, Push(String), false, r#"""#),
        rule(CODE, TokenKind::Keyword, Keep, false, r"(?:panic|output|import|attrify)\b"),
        rule(CODE, TokenKind::Number, Keep, false, r"[0-9]+(?:\.[0-9]+)?\b"),
        rule(CODE, TokenKind::Ident, Keep, false, r"[a-zA-Z0-9_]+"),
        rule(CODE, TokenKind::Comment, Keep, true, r"#[^\n\r]*"),
        rule(CODE, TokenKind::Space, Keep, true, r"[ \t\n\r]+"),
        rule(STRING, TokenKind::InterpBegin, Push(Interp), false, r"\{\{"),
        rule(STRING, TokenKind::StringEnd, Pop, false, r#"""#),
        rule(STRING, TokenKind::Char, Keep, false, r"."),
        rule(MULTI, TokenKind::InterpBegin, Push(Interp), false, r"\{\{"),
        rule(MULTI, TokenKind::MultilineEnd, Pop, false, r"''"),
        rule(MULTI, TokenKind::Char, Keep, false, r"(?s:.)"),
    ]
});

/// Snapshot of the lexer cursor for backtracking.
#[derive(Debug, Clone)]
pub struct LexerState {
    offset: usize,
    states: Vec<LexState>,
    token: Token,
    valid: bool,
}

/// Converts source text into tokens, one at a time.
pub struct Lexer {
    file: Rc<SourceFile>,
    offset: usize,
    states: Vec<LexState>,
    /// The current token.
    pub token: Token,
    /// False once `eof` or an `illegal` token has been produced.
    pub valid: bool,
}

impl Lexer {
    /// Create a lexer positioned on the first token.
    pub fn new(file: &Rc<SourceFile>) -> Self {
        let mut lexer = Self {
            file: Rc::clone(file),
            offset: 0,
            states: vec![LexState::Root],
            token: Token {
                pos: Position::new(file, 0, 0),
                kind: TokenKind::Eof,
                content: String::new(),
            },
            valid: false,
        };
        lexer.next();
        lexer
    }

    pub fn file(&self) -> &Rc<SourceFile> {
        &self.file
    }

    /// Advance to the next token. Returns false at `eof` or on an `illegal` token.
    pub fn next(&mut self) -> bool {
        let file = Rc::clone(&self.file);
        let text = &file.content;
        loop {
            // Only string and interpolation rules pop, and they never run at the root.
            debug_assert!(!self.states.is_empty());
            let state = self.states.last().copied().unwrap_or(LexState::Root);

            if self.offset >= text.len() {
                if self.states.len() != 1 {
                    let start = text.char_indices().last().map_or(0, |(i, _)| i);
                    return self.fail(start, text.len(), format!("unclosed {}", state.name()));
                }
                // Empty range past the last byte, so eof never shares a start with a real token.
                self.token = Token {
                    pos: Position::new(&file, text.len(), text.len()),
                    kind: TokenKind::Eof,
                    content: String::new(),
                };
                self.valid = false;
                return false;
            }

            let rest = &text[self.offset..];
            let matched = RULES
                .iter()
                .filter(|r| r.states.contains(&state))
                .find_map(|r| r.pattern.find(rest).map(|m| (r, m.end())));

            let Some((rule, length)) = matched else {
                let ch = rest.chars().next().unwrap_or('\0');
                return self.fail(
                    self.offset,
                    self.offset + ch.len_utf8(),
                    format!("illegal character `{}`", ch.escape_debug()),
                );
            };

            match rule.transition {
                Transition::Keep => {}
                Transition::Push(next) => self.states.push(next),
                Transition::Pop => {
                    self.states.pop();
                }
            }
            let start = self.offset;
            self.offset += length;

            if rule.skip {
                continue;
            }
            self.token = Token {
                pos: Position::new(&file, start, self.offset),
                kind: rule.kind,
                content: text[start..self.offset].to_string(),
            };
            self.valid = true;
            return true;
        }
    }

    fn fail(&mut self, start: usize, end: usize, message: String) -> bool {
        self.token = Token {
            pos: Position::new(&self.file, start, end),
            kind: TokenKind::Illegal,
            content: message,
        };
        self.valid = false;
        false
    }

    pub fn save(&self) -> LexerState {
        LexerState {
            offset: self.offset,
            states: self.states.clone(),
            token: self.token.clone(),
            valid: self.valid,
        }
    }

    pub fn load(&mut self, state: LexerState) {
        self.offset = state.offset;
        self.states = state.states;
        self.token = state.token;
        self.valid = state.valid;
    }
}
