//! PC-005: Abstract syntax tree with structural hashing.
//!
//! Nodes are immutable once parsed and shared through [`NodeRef`]. The
//! structural hash covers node names, literal text and children (map entries
//! in sorted key order) and is the cache key for `output` nodes.

use super::types::Position;
use crate::store::hasher;
use indexmap::IndexMap;
use std::io::{self, Write};
use std::rc::Rc;

pub type NodeRef = Rc<Node>;

/// One entry of a [`LiteralMap`]: the key as written, and its value.
/// Lambda parameters without a default have no value.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: NodeRef,
    pub value: Option<NodeRef>,
}

/// Name → (key node, value node), unique keys, declaration order preserved.
#[derive(Debug, Clone, Default)]
pub struct LiteralMap {
    entries: IndexMap<String, MapEntry>,
}

impl LiteralMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns false if the name was already present.
    pub fn insert(&mut self, name: String, entry: MapEntry) -> bool {
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, entry);
        true
    }

    pub fn get(&self, name: &str) -> Option<&MapEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MapEntry)> {
        self.entries.iter()
    }

    /// Entries in key order, independent of declaration order.
    pub fn sorted(&self) -> Vec<(&String, &MapEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    fn write_hash(&self, h: &mut blake3::Hasher) {
        for (name, entry) in self.sorted() {
            h.update(name.as_bytes());
            h.update(b"\0");
            match &entry.value {
                Some(value) => value.write_hash(h),
                None => {
                    h.update(b"none\0");
                }
            }
        }
        h.update(b"\x01");
    }

    fn children(&self) -> Vec<&NodeRef> {
        let mut out = Vec::new();
        for entry in self.entries.values() {
            out.push(&entry.key);
            if let Some(value) = &entry.value {
                out.push(value);
            }
        }
        out
    }
}

/// Node variants.
#[derive(Debug)]
pub enum NodeKind {
    Literal(String),
    Number(String),
    /// Fragments in source order: literal runs and interpolated expressions.
    String(Vec<NodeRef>),
    List(Vec<NodeRef>),
    Dict(LiteralMap),
    Lambda {
        target: NodeRef,
        params: LiteralMap,
    },
    Call {
        target: NodeRef,
        args: LiteralMap,
    },
    Getter {
        target: NodeRef,
        attribute: NodeRef,
    },
    Reference {
        variable: NodeRef,
    },
    Import {
        source: NodeRef,
    },
    /// A dict of options, or a bare script expression.
    Output {
        options: NodeRef,
    },
    Panic {
        message: NodeRef,
    },
    Attrify {
        target: NodeRef,
    },
}

/// A positioned AST node.
#[derive(Debug)]
pub struct Node {
    pub pos: Position,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(pos: Position, kind: NodeKind) -> NodeRef {
        Rc::new(Self { pos, kind })
    }

    pub fn literal(pos: Position, content: impl Into<String>) -> NodeRef {
        Self::new(pos, NodeKind::Literal(content.into()))
    }

    /// Display name of the variant.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Literal(_) => "literal",
            NodeKind::Number(_) => "number",
            NodeKind::String(_) => "string",
            NodeKind::List(_) => "list",
            NodeKind::Dict(_) => "dict",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Call { .. } => "call",
            NodeKind::Getter { .. } => "getter",
            NodeKind::Reference { .. } => "reference",
            NodeKind::Import { .. } => "import",
            NodeKind::Output { .. } => "output",
            NodeKind::Panic { .. } => "panic",
            NodeKind::Attrify { .. } => "attrify",
        }
    }

    /// Text of a literal node.
    pub fn as_literal(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Literal(s) => Some(s),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<&NodeRef> {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Number(_) => vec![],
            NodeKind::String(items) | NodeKind::List(items) => items.iter().collect(),
            NodeKind::Dict(map) => map.children(),
            NodeKind::Lambda { target, params } => {
                let mut out = params.children();
                out.push(target);
                out
            }
            NodeKind::Call { target, args } => {
                let mut out = vec![target];
                out.extend(args.children());
                out
            }
            NodeKind::Getter { target, attribute } => vec![target, attribute],
            NodeKind::Reference { variable } => vec![variable],
            NodeKind::Import { source } => vec![source],
            NodeKind::Output { options } => vec![options],
            NodeKind::Panic { message } => vec![message],
            NodeKind::Attrify { target } => vec![target],
        }
    }

    /// Feed this node's shape into `h`.
    pub fn write_hash(&self, h: &mut blake3::Hasher) {
        h.update(self.name().as_bytes());
        h.update(b"\0");
        match &self.kind {
            NodeKind::Literal(s) | NodeKind::Number(s) => {
                h.update(s.as_bytes());
                h.update(b"\0");
            }
            NodeKind::String(items) | NodeKind::List(items) => {
                for item in items {
                    item.write_hash(h);
                }
                h.update(b"\x01");
            }
            NodeKind::Dict(map) => map.write_hash(h),
            NodeKind::Lambda { target, params } => {
                params.write_hash(h);
                target.write_hash(h);
            }
            NodeKind::Call { target, args } => {
                target.write_hash(h);
                args.write_hash(h);
            }
            NodeKind::Getter { target, attribute } => {
                target.write_hash(h);
                attribute.write_hash(h);
            }
            NodeKind::Reference { variable } => variable.write_hash(h),
            NodeKind::Import { source } => source.write_hash(h),
            NodeKind::Output { options } => options.write_hash(h),
            NodeKind::Panic { message } => message.write_hash(h),
            NodeKind::Attrify { target } => target.write_hash(h),
        }
    }

    /// 16-hex-character structural hash.
    pub fn structural_hash(&self) -> String {
        let mut h = blake3::Hasher::new();
        self.write_hash(&mut h);
        hasher::short_key(&h.finalize())
    }
}

/// Print an indented tree: `name at start-end: hash`.
pub fn print_tree<W: Write>(w: &mut W, node: &Node, level: usize) -> io::Result<()> {
    writeln!(
        w,
        "{}{} at {}-{}: {}",
        "    ".repeat(level),
        node.name(),
        node.pos.start,
        node.pos.end,
        node.structural_hash()
    )?;
    for child in node.children() {
        print_tree(w, child, level + 1)?;
    }
    Ok(())
}
