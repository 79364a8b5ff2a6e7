//! PC-004: Backtracking recursive-descent parser.
//!
//! Alternatives are tried with [`Parser::choice`], which snapshots the lexer
//! before each attempt and restores it on failure. Every expected-token miss
//! is recorded against the token it happened at; the miss that reached
//! furthest into the input is the one reported, with the expected sets of
//! equally-far misses merged.

use super::ast::{LiteralMap, MapEntry, Node, NodeKind, NodeRef};
use super::error::{ErrorKind, RecipeError, RecipeResult};
use super::lexer::Lexer;
use super::types::{Position, SourceFile, Token, TokenKind};
use std::path::Path;
use std::rc::Rc;

enum Failure {
    /// Expected-token miss, recorded in [`Parser::furthest`].
    Expected,
    /// Unrecoverable error (duplicate key).
    Fatal(RecipeError),
}

type PResult<T> = Result<T, Failure>;

type Alternative = fn(&mut Parser) -> PResult<NodeRef>;

struct Miss {
    got: Token,
    expect: Vec<String>,
}

struct Parser {
    lex: Lexer,
    furthest: Option<Miss>,
}

impl Parser {
    fn new(file: &Rc<SourceFile>) -> Self {
        Self {
            lex: Lexer::new(file),
            furthest: None,
        }
    }

    fn miss(&mut self, expect: String) -> Failure {
        let got = &self.lex.token;
        match &mut self.furthest {
            Some(m) if m.got.pos.start > got.pos.start => {}
            Some(m) if m.got.pos.start == got.pos.start => m.expect.push(expect),
            _ => {
                self.furthest = Some(Miss {
                    got: got.clone(),
                    expect: vec![expect],
                })
            }
        }
        Failure::Expected
    }

    fn expect_kind(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.lex.token.kind == kind {
            let tok = self.lex.token.clone();
            self.lex.next();
            return Ok(tok);
        }
        Err(self.miss(kind.to_string()))
    }

    fn expect_content(&mut self, content: &str) -> PResult<Token> {
        let tok = &self.lex.token;
        if tok.kind != TokenKind::Illegal && tok.kind != TokenKind::Char && tok.content == content {
            let tok = tok.clone();
            self.lex.next();
            return Ok(tok);
        }
        Err(self.miss(format!("`{}`", content)))
    }

    fn peek(&self, content: &str) -> bool {
        let tok = &self.lex.token;
        self.lex.valid && tok.kind == TokenKind::Symbol && tok.content == content
    }

    fn choice(&mut self, alternatives: &[Alternative]) -> PResult<NodeRef> {
        for alt in alternatives {
            let saved = self.lex.save();
            match alt(self) {
                Ok(node) => return Ok(node),
                Err(Failure::Fatal(e)) => return Err(Failure::Fatal(e)),
                Err(Failure::Expected) => self.lex.load(saved),
            }
        }
        Err(Failure::Expected)
    }

    fn literal(tok: &Token) -> NodeRef {
        Node::literal(tok.pos.clone(), tok.content.clone())
    }

    fn insert(map: &mut LiteralMap, ident: &Token, value: Option<NodeRef>) -> PResult<()> {
        let entry = MapEntry {
            key: Self::literal(ident),
            value,
        };
        if map.insert(ident.content.clone(), entry) {
            Ok(())
        } else {
            Err(Failure::Fatal(RecipeError::new(
                ErrorKind::Parse,
                ident.pos.clone(),
                format!("duplicate key `{}`", ident.content),
            )))
        }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    fn value(&mut self) -> PResult<NodeRef> {
        let node = self.primary()?;
        self.postfix(node)
    }

    fn primary(&mut self) -> PResult<NodeRef> {
        self.choice(&[
            Self::quoted,
            Self::multiline,
            Self::number,
            Self::path,
            Self::lambda,
            Self::reference,
            Self::list,
            Self::dict,
            Self::surrounded,
            Self::output,
            Self::import,
            Self::panic,
            Self::attrify,
        ])
    }

    fn postfix(&mut self, mut node: NodeRef) -> PResult<NodeRef> {
        loop {
            if self.peek(".") {
                self.lex.next();
                let ident = self.expect_kind(TokenKind::Ident)?;
                let pos = node.pos.stretch(&ident.pos);
                node = Node::new(
                    pos,
                    NodeKind::Getter {
                        target: node,
                        attribute: Self::literal(&ident),
                    },
                );
            } else if self.peek("[") {
                self.lex.next();
                let attribute = self.value()?;
                let end = self.expect_content("]")?;
                let pos = node.pos.stretch(&end.pos);
                node = Node::new(pos, NodeKind::Getter { target: node, attribute });
            } else if self.peek("(") {
                self.lex.next();
                let mut args = LiteralMap::new();
                while self.lex.valid {
                    if !args.is_empty() && self.expect_content(",").is_err() {
                        break;
                    }
                    let Ok(ident) = self.expect_kind(TokenKind::Ident) else {
                        break;
                    };
                    self.expect_content("=")?;
                    let value = self.value()?;
                    Self::insert(&mut args, &ident, Some(value))?;
                }
                let end = self.expect_content(")")?;
                let pos = node.pos.stretch(&end.pos);
                node = Node::new(pos, NodeKind::Call { target: node, args });
            } else {
                return Ok(node);
            }
        }
    }

    fn quoted(&mut self) -> PResult<NodeRef> {
        self.string("\"", TokenKind::StringEnd)
    }

    fn multiline(&mut self) -> PResult<NodeRef> {
        self.string("''", TokenKind::MultilineEnd)
    }

    fn string(&mut self, wrap: &str, closer: TokenKind) -> PResult<NodeRef> {
        let begin = self.expect_content(wrap)?;
        let mut fragments = Vec::new();
        let mut run = String::new();
        let mut run_start = 0;

        while self.lex.valid {
            match self.lex.token.kind {
                TokenKind::Char => {
                    if run.is_empty() {
                        run_start = self.lex.token.pos.start;
                    }
                    run.push_str(&self.lex.token.content);
                    self.lex.next();
                }
                TokenKind::InterpBegin => {
                    self.lex.next();
                    if !run.is_empty() {
                        let pos = Position::new(self.lex.file(), run_start, run_start + run.len());
                        fragments.push(Node::literal(pos, std::mem::take(&mut run)));
                    }
                    fragments.push(self.value()?);
                    self.expect_kind(TokenKind::InterpEnd)?;
                }
                _ => break,
            }
        }
        let end = self.expect_kind(closer)?;
        if !run.is_empty() {
            let pos = Position::new(self.lex.file(), run_start, run_start + run.len());
            fragments.push(Node::literal(pos, run));
        }
        Ok(Node::new(
            begin.pos.stretch(&end.pos),
            NodeKind::String(fragments),
        ))
    }

    fn number(&mut self) -> PResult<NodeRef> {
        let tok = self.expect_kind(TokenKind::Number)?;
        Ok(Node::new(tok.pos, NodeKind::Number(tok.content)))
    }

    fn path(&mut self) -> PResult<NodeRef> {
        let tok = self.expect_kind(TokenKind::Path)?;
        Ok(Self::literal(&tok))
    }

    fn lambda(&mut self) -> PResult<NodeRef> {
        let begin = self.expect_content("(")?;
        let mut params = LiteralMap::new();
        while self.lex.valid {
            if !params.is_empty() && self.expect_content(",").is_err() {
                break;
            }
            let Ok(ident) = self.expect_kind(TokenKind::Ident) else {
                break;
            };
            let default = if self.expect_content("=").is_ok() {
                Some(self.value()?)
            } else {
                None
            };
            Self::insert(&mut params, &ident, default)?;
        }
        self.expect_content(")")?;
        self.expect_content("->")?;
        let target = self.value()?;
        let pos = begin.pos.stretch(&target.pos);
        Ok(Node::new(pos, NodeKind::Lambda { target, params }))
    }

    fn reference(&mut self) -> PResult<NodeRef> {
        let begin = self.expect_content("$")?;
        let ident = self.expect_kind(TokenKind::Ident)?;
        Ok(Node::new(
            begin.pos.stretch(&ident.pos),
            NodeKind::Reference {
                variable: Self::literal(&ident),
            },
        ))
    }

    fn list(&mut self) -> PResult<NodeRef> {
        let begin = self.expect_content("[")?;
        let mut items = Vec::new();
        while self.lex.valid {
            if !items.is_empty() && self.expect_content(",").is_err() {
                break;
            }
            let saved = self.lex.save();
            match self.value() {
                Ok(item) => items.push(item),
                Err(Failure::Fatal(e)) => return Err(Failure::Fatal(e)),
                Err(Failure::Expected) => {
                    self.lex.load(saved);
                    break;
                }
            }
        }
        let end = self.expect_content("]")?;
        Ok(Node::new(begin.pos.stretch(&end.pos), NodeKind::List(items)))
    }

    fn dict(&mut self) -> PResult<NodeRef> {
        let begin = self.expect_content("{")?;
        let mut items = LiteralMap::new();
        while self.lex.valid {
            if !items.is_empty() && self.expect_content(",").is_err() {
                break;
            }
            let Ok(ident) = self.expect_kind(TokenKind::Ident) else {
                break;
            };
            self.expect_content("=")?;
            let value = self.value()?;
            Self::insert(&mut items, &ident, Some(value))?;
        }
        let end = self.expect_content("}")?;
        Ok(Node::new(begin.pos.stretch(&end.pos), NodeKind::Dict(items)))
    }

    fn surrounded(&mut self) -> PResult<NodeRef> {
        self.expect_content("(")?;
        let value = self.value()?;
        self.expect_content(")")?;
        Ok(value)
    }

    fn keyword(&mut self, word: &str) -> PResult<Token> {
        if self.lex.token.kind == TokenKind::Keyword && self.lex.token.content == word {
            let tok = self.lex.token.clone();
            self.lex.next();
            return Ok(tok);
        }
        Err(self.miss(format!("`{}`", word)))
    }

    fn output(&mut self) -> PResult<NodeRef> {
        let begin = self.keyword("output")?;
        let options = self.primary()?;
        Ok(Node::new(
            begin.pos.stretch(&options.pos),
            NodeKind::Output { options },
        ))
    }

    fn import(&mut self) -> PResult<NodeRef> {
        let begin = self.keyword("import")?;
        let source = self.primary()?;
        Ok(Node::new(
            begin.pos.stretch(&source.pos),
            NodeKind::Import { source },
        ))
    }

    fn panic(&mut self) -> PResult<NodeRef> {
        let begin = self.keyword("panic")?;
        let message = self.value()?;
        Ok(Node::new(
            begin.pos.stretch(&message.pos),
            NodeKind::Panic { message },
        ))
    }

    fn attrify(&mut self) -> PResult<NodeRef> {
        let begin = self.keyword("attrify")?;
        let target = self.value()?;
        Ok(Node::new(
            begin.pos.stretch(&target.pos),
            NodeKind::Attrify { target },
        ))
    }

    fn file(&mut self) -> PResult<NodeRef> {
        let node = self.value()?;
        self.expect_kind(TokenKind::Eof)?;
        Ok(node)
    }

    /// Turn the furthest recorded miss into a diagnostic.
    fn into_error(self) -> RecipeError {
        let Some(mut miss) = self.furthest else {
            let tok = self.lex.token;
            return RecipeError::new(ErrorKind::Parse, tok.pos, "unexpected input");
        };
        if miss.got.kind == TokenKind::Illegal {
            return RecipeError::new(ErrorKind::Lex, miss.got.pos, miss.got.content);
        }
        miss.expect.sort();
        miss.expect.dedup();
        let got = if miss.got.kind == TokenKind::Eof {
            "end of file".to_string()
        } else {
            format!("`{}`", miss.got.content)
        };
        RecipeError::new(
            ErrorKind::Parse,
            miss.got.pos,
            format!("expected token {} but got {}", join_expected(&miss.expect), got),
        )
    }
}

fn join_expected(expect: &[String]) -> String {
    match expect {
        [] => String::new(),
        [one] => one.clone(),
        [rest @ .., last] => format!("{} or {}", rest.join(", "), last),
    }
}

/// Parse a whole recipe; the input must be exactly one value followed by eof.
pub fn parse(filename: &str, content: &str) -> RecipeResult<NodeRef> {
    let file = SourceFile::new(filename, content);
    let mut parser = Parser::new(&file);
    match parser.file() {
        Ok(node) => Ok(node),
        Err(Failure::Fatal(e)) => Err(e),
        Err(Failure::Expected) => Err(parser.into_error()),
    }
}

/// Read and parse a recipe file.
pub fn parse_file(path: &Path) -> RecipeResult<NodeRef> {
    let filename = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| {
        RecipeError::foreign(
            ErrorKind::Io,
            Position::synthetic(&filename),
            &format!("cannot read {}", filename),
            e,
        )
    })?;
    parse(&filename, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(src: &str) -> NodeRef {
        match parse("t.pc", src) {
            Ok(node) => node,
            Err(e) => panic!("parse of {:?} failed: {}", src, e),
        }
    }

    fn err(src: &str) -> RecipeError {
        match parse("t.pc", src) {
            Ok(node) => panic!("parse of {:?} unexpectedly gave {}", src, node.name()),
            Err(e) => e,
        }
    }

    #[test]
    fn test_pc004_string_fragments() {
        let node = ok(r#""hello {{ "world" }}!""#);
        let NodeKind::String(frags) = &node.kind else {
            panic!("expected string, got {}", node.name());
        };
        let names: Vec<_> = frags.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["literal", "string", "literal"]);
        assert_eq!(frags[0].as_literal(), Some("hello "));
        assert_eq!(frags[2].as_literal(), Some("!"));
    }

    #[test]
    fn test_pc004_multiline_string() {
        let node = ok("''line one\nline {{ $x }}''");
        let NodeKind::String(frags) = &node.kind else {
            panic!("expected string");
        };
        assert_eq!(frags[0].as_literal(), Some("line one\nline "));
        assert_eq!(frags[1].name(), "reference");
    }

    #[test]
    fn test_pc004_getter_on_dict() {
        let node = ok("({a=1, b=2}.a)");
        let NodeKind::Getter { target, attribute } = &node.kind else {
            panic!("expected getter, got {}", node.name());
        };
        assert_eq!(target.name(), "dict");
        assert_eq!(attribute.as_literal(), Some("a"));
    }

    #[test]
    fn test_pc004_lambda_and_call() {
        let node = ok("((x, y=\"d\") -> $x)(x=1)");
        let NodeKind::Call { target, args } = &node.kind else {
            panic!("expected call, got {}", node.name());
        };
        let NodeKind::Lambda { params, .. } = &target.kind else {
            panic!("expected lambda");
        };
        assert!(params.get("x").unwrap().value.is_none());
        assert!(params.get("y").unwrap().value.is_some());
        assert!(args.contains("x"));
    }

    #[test]
    fn test_pc004_empty_lambda() {
        let node = ok("() -> \"x\"");
        assert_eq!(node.name(), "lambda");
    }

    #[test]
    fn test_pc004_surrounded_is_not_lambda() {
        let node = ok("(\"x\")");
        assert_eq!(node.name(), "string");
    }

    #[test]
    fn test_pc004_list_and_index() {
        let node = ok("[\"a\", ./b, 3][1]");
        let NodeKind::Getter { target, attribute } = &node.kind else {
            panic!("expected getter");
        };
        let NodeKind::List(items) = &target.kind else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].as_literal(), Some("./b"));
        assert_eq!(attribute.name(), "number");
    }

    #[test]
    fn test_pc004_empty_containers() {
        assert_eq!(ok("[]").name(), "list");
        assert_eq!(ok("{}").name(), "dict");
    }

    #[test]
    fn test_pc004_output_forms() {
        let dict_form = ok("output {script=\"echo hi > $out\"}");
        let NodeKind::Output { options } = &dict_form.kind else {
            panic!("expected output");
        };
        assert_eq!(options.name(), "dict");

        let bare = ok("output \"echo hi > $out\"");
        let NodeKind::Output { options } = &bare.kind else {
            panic!("expected output");
        };
        assert_eq!(options.name(), "string");
    }

    #[test]
    fn test_pc004_output_getter_binds_outside() {
        let node = ok("output {script=\"x\"}.bin");
        let NodeKind::Getter { target, .. } = &node.kind else {
            panic!("expected getter, got {}", node.name());
        };
        assert_eq!(target.name(), "output");
    }

    #[test]
    fn test_pc004_import_call() {
        let node = ok("import ./lib.pc (x=1)");
        let NodeKind::Call { target, .. } = &node.kind else {
            panic!("expected call, got {}", node.name());
        };
        assert_eq!(target.name(), "import");
    }

    #[test]
    fn test_pc004_panic_and_attrify() {
        assert_eq!(ok("panic \"boom\"").name(), "panic");
        assert_eq!(ok("attrify {a=\"1\"}").name(), "attrify");
    }

    #[test]
    fn test_pc004_comments_skipped() {
        let node = ok("# leading\n{\n  a = 1, # trailing\n  b = 2\n}\n");
        let NodeKind::Dict(items) = &node.kind else {
            panic!("expected dict");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_pc004_error_expected_set() {
        let e = err("{a = }");
        assert_eq!(e.kind, ErrorKind::Parse);
        assert!(e.message.starts_with("expected token "), "{}", e.message);
        assert!(e.message.ends_with("but got `}`"), "{}", e.message);
        assert!(e.message.contains("`$`"), "{}", e.message);
        assert!(e.message.contains("number"), "{}", e.message);
        assert_eq!(e.pos.start, 5);
    }

    #[test]
    fn test_pc004_error_longest_match() {
        // The failure inside the nested dict is further than the list closer.
        let e = err("[{a = 1, b = }]");
        assert_eq!(e.pos.start, 13);
        assert!(e.message.ends_with("but got `}`"), "{}", e.message);
    }

    #[test]
    fn test_pc004_trailing_input() {
        let e = err("\"a\" \"b\"");
        assert!(e.message.contains("eof"), "{}", e.message);
        assert_eq!(e.pos.start, 4);
    }

    #[test]
    fn test_pc004_lex_error_surfaces() {
        let e = err("{a = \"open");
        assert_eq!(e.kind, ErrorKind::Lex);
        assert_eq!(e.message, "unclosed string");

        let e = err("{a = @}");
        assert_eq!(e.kind, ErrorKind::Lex);
        assert_eq!(e.message, "illegal character `@`");
    }

    #[test]
    fn test_pc004_nested_output_error_is_linear() {
        let src = format!("{}}}", "output {a = ".repeat(40));
        let started = std::time::Instant::now();
        let e = err(&src);
        assert_eq!(e.kind, ErrorKind::Parse);
        assert!(e.message.ends_with("but got `}`"), "{}", e.message);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_pc004_unclosed_multibyte_renders() {
        let e = err("\"\u{e9}");
        assert_eq!(e.kind, ErrorKind::Lex);
        let trace = crate::core::error::render_trace(&e);
        assert!(trace.ends_with("t.pc:1:2: unclosed string\n"), "{}", trace);
    }

    #[test]
    fn test_pc004_duplicate_key() {
        let e = err("{a = 1, a = 2}");
        assert_eq!(e.kind, ErrorKind::Parse);
        assert_eq!(e.message, "duplicate key `a`");
        assert_eq!(e.pos.start, 8);
    }

    #[test]
    fn test_pc004_keyword_not_referencable() {
        let e = err("$output");
        assert_eq!(e.kind, ErrorKind::Parse);
    }

    #[test]
    fn test_pc004_unexpected_eof_message() {
        let e = err("[1,");
        assert!(e.message.ends_with("but got end of file"), "{}", e.message);
    }

    #[test]
    fn test_pc004_parse_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let e = parse_file(&dir.path().join("missing.pc")).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Io);
    }

    #[test]
    fn test_pc004_parse_file_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pc");
        std::fs::write(&path, "{a = \"x\"}").unwrap();
        let node = parse_file(&path).unwrap();
        assert_eq!(node.name(), "dict");
        assert_eq!(node.pos.file.filename, path.display().to_string());
    }
}
