//! PC-007: Evaluator, turning a resolved node into a [`Value`].
//!
//! Evaluation is lazy and call-by-name: nothing bound in a scope is evaluated
//! until a reference to it is. Outputs are handled by the executor.

use super::ast::{NodeKind, NodeRef};
use super::config::EvalConfig;
use super::error::{ErrorKind, RecipeError, RecipeResult};
use super::parser;
use super::scope::Scope;
use super::value::{Attribute, Value, ValueBuilder};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

/// Maximum nesting of `evaluate` calls.
pub const MAX_DEPTH: usize = 256;

pub struct Evaluator<'a> {
    pub(crate) config: &'a EvalConfig,
    depth: Cell<usize>,
}

pub(super) struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(config: &'a EvalConfig) -> Self {
        Self {
            config,
            depth: Cell::new(0),
        }
    }

    pub(super) fn enter(&self, node: &NodeRef) -> RecipeResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(RecipeError::new(
                ErrorKind::Limit,
                node.pos.clone(),
                format!("evaluation nested deeper than {}", MAX_DEPTH),
            ));
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    pub fn evaluate(&self, node: &NodeRef, scope: &Scope) -> RecipeResult<Rc<Value>> {
        let _guard = self.enter(node)?;
        let (node, scope) = self.unwrap(node, scope)?;

        let value = match &node.kind {
            NodeKind::Literal(content) => Value::text("literal", content.as_str()),
            NodeKind::Number(content) => Value::text("number", content.as_str()),

            NodeKind::String(fragments) => {
                let mut b = ValueBuilder::new();
                for fragment in fragments {
                    match fragment.as_literal() {
                        Some(text) => b.write_str(text),
                        None => {
                            let v = self
                                .evaluate(fragment, &scope)
                                .map_err(|e| e.wrap(&fragment.pos, "while evaluating interpolation"))?;
                            b.write_value(v, false);
                        }
                    }
                }
                b.finish("string")
            }

            NodeKind::List(items) => {
                let mut b = ValueBuilder::new();
                let mut attributes = indexmap::IndexMap::new();
                for (i, item) in items.iter().enumerate() {
                    let v = self
                        .evaluate(item, &scope)
                        .map_err(|e| e.wrap(&node.pos, "while evaluating list"))?;
                    if i > 0 {
                        b.write_str(" ");
                    }
                    b.write_value(Rc::clone(&v), true);
                    let key = i.to_string();
                    attributes.insert(
                        key.clone(),
                        Attribute {
                            key: Rc::new(Value::text("number", key)),
                            value: v,
                        },
                    );
                }
                let mut list = b.finish("list");
                list.attributes = attributes;
                list
            }

            NodeKind::Dict(items) => {
                let mut dict = Value::text("dict", "");
                for (name, entry) in items.iter() {
                    let key = self
                        .evaluate(&entry.key, &scope)
                        .map_err(|e| e.wrap(&entry.key.pos, "while evaluating dict key"))?;
                    let value = match &entry.value {
                        Some(v) => self
                            .evaluate(v, &scope)
                            .map_err(|e| e.wrap(&entry.key.pos, format!("while evaluating `{}`", name)))?,
                        None => Rc::new(Value::text("literal", "")),
                    };
                    dict.attributes.insert(name.clone(), Attribute { key, value });
                }
                dict
            }

            NodeKind::Getter { target, attribute } => {
                let t = self
                    .evaluate(target, &scope)
                    .map_err(|e| e.wrap(&node.pos, "while evaluating getter target"))?;
                let name = self
                    .evaluate(attribute, &scope)
                    .map_err(|e| e.wrap(&node.pos, "while evaluating getter attribute"))?;
                return match t.attribute(&name.content) {
                    Some(attr) => Ok(Rc::clone(&attr.value)),
                    None => Err(RecipeError::new(
                        ErrorKind::Attribute,
                        attribute.pos.clone(),
                        format!("target has no attribute `{}`", name.content),
                    )),
                };
            }

            NodeKind::Attrify { target } => {
                let t = self
                    .evaluate(target, &scope)
                    .map_err(|e| e.wrap(&node.pos, "while evaluating attrify"))?;
                if t.attributes.is_empty() && !t.content.is_empty() {
                    return Err(RecipeError::new(
                        ErrorKind::Cast,
                        target.pos.clone(),
                        format!("{} has no attributes to attrify", target.name()),
                    ));
                }
                let mut b = ValueBuilder::new();
                for (name, attr) in &t.attributes {
                    if !b.is_empty() {
                        b.write_str(" ");
                    }
                    b.write_str(name);
                    b.write_str("=");
                    b.write_value(Rc::clone(&attr.value), true);
                }
                b.finish("attrify")
            }

            NodeKind::Panic { message } => {
                let m = self
                    .evaluate(message, &scope)
                    .map_err(|e| e.wrap(&node.pos, "while evaluating panic"))?;
                return Err(RecipeError::new(ErrorKind::Panic, node.pos.clone(), m.content.clone()));
            }

            NodeKind::Output { options } => return self.output(&node, options, &scope),

            NodeKind::Lambda { .. }
            | NodeKind::Call { .. }
            | NodeKind::Reference { .. }
            | NodeKind::Import { .. } => {
                return Err(RecipeError::new(
                    ErrorKind::Cast,
                    node.pos.clone(),
                    format!("{} is not evaluable", node.name()),
                ))
            }
        };
        Ok(Rc::new(value))
    }
}

/// Parse and evaluate a recipe file with an empty scope.
pub fn evaluate_recipe(path: &Path, config: &EvalConfig) -> RecipeResult<Rc<Value>> {
    let node = parser::parse_file(path)?;
    Evaluator::new(config).evaluate(&node, &Scope::new())
}

/// Parse and evaluate recipe text.
pub fn evaluate_source(filename: &str, content: &str, config: &EvalConfig) -> RecipeResult<Rc<Value>> {
    let node = parser::parse(filename, content)?;
    Evaluator::new(config).evaluate(&node, &Scope::new())
}
