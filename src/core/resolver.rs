//! PC-006: Resolver collapsing import, call and reference chains.
//!
//! [`Evaluator::unwrap`] loops instead of recursing through `evaluate`, so a
//! chain of indirections costs one step each. It returns the first node that
//! is not an indirection, together with the scope it must be evaluated in.

use super::ast::{NodeKind, NodeRef};
use super::error::{ErrorKind, RecipeError, RecipeResult};
use super::evaluator::Evaluator;
use super::parser;
use super::scope::Scope;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Upper bound on indirections followed by one `unwrap`.
pub const MAX_UNWRAP_STEPS: usize = 10_000;

/// Resolve an import path against the directory of the importing file.
pub fn import_path(importer: &str, target: &str) -> PathBuf {
    let base = Path::new(importer).parent().unwrap_or_else(|| Path::new(""));
    base.join(target)
}

impl Evaluator<'_> {
    pub fn unwrap(&self, node: &NodeRef, scope: &Scope) -> RecipeResult<(NodeRef, Scope)> {
        let mut node = Rc::clone(node);
        let mut scope = scope.clone();

        for _ in 0..MAX_UNWRAP_STEPS {
            let (next, next_scope) = match &node.kind {
                NodeKind::Import { source } => {
                    let target = self
                        .evaluate(source, &scope)
                        .map_err(|e| e.wrap(&node.pos, "while evaluating import"))?;
                    let path = import_path(&node.pos.file.filename, &target.content);
                    tracing::debug!("importing {}", path.display());
                    let imported = parser::parse_file(&path)
                        .map_err(|e| e.wrap(&node.pos, "while evaluating import"))?;
                    (imported, Scope::new())
                }

                NodeKind::Call { target, args } => {
                    let callee = {
                        let _guard = self.enter(target)?;
                        self.unwrap(target, &scope)
                    };
                    let (callee, defining) = callee
                        .map_err(|e| e.wrap(&node.pos, format!("unable to call {}", target.name())))?;
                    let NodeKind::Lambda { target: body, params } = &callee.kind else {
                        return Err(RecipeError::new(
                            ErrorKind::Cast,
                            node.pos.clone(),
                            format!("unable to call {}", callee.name()),
                        ));
                    };
                    if let Some((name, arg)) = args.iter().find(|(name, _)| !params.contains(name)) {
                        return Err(RecipeError::new(
                            ErrorKind::Argument,
                            arg.key.pos.clone(),
                            format!("lambda has no parameter `{}`", name),
                        ));
                    }

                    let mut inner = defining.clone();
                    for (name, param) in params.iter() {
                        if let Some(value) = args.get(name).and_then(|a| a.value.as_ref()) {
                            inner = inner.set(name, Rc::clone(value), Some(scope.clone()));
                        } else if let Some(default) = &param.value {
                            inner = inner.set(name, Rc::clone(default), Some(defining.clone()));
                        } else {
                            return Err(RecipeError::new(
                                ErrorKind::Argument,
                                node.pos.clone(),
                                format!("lambda called without parameter `{}`", name),
                            ));
                        }
                    }
                    (Rc::clone(body), inner)
                }

                NodeKind::Reference { variable } => {
                    let name = variable.as_literal().unwrap_or_default();
                    let Some(binding) = scope.get(name) else {
                        let message = match scope.suggest(name) {
                            Some(similar) => format!(
                                "`{}` is not defined in current scope, do you mean `{}`?",
                                name, similar
                            ),
                            None => format!("`{}` is not defined in current scope", name),
                        };
                        return Err(RecipeError::new(ErrorKind::Reference, node.pos.clone(), message));
                    };
                    let Some(bound_scope) = binding.scope_in(&scope) else {
                        return Err(RecipeError::new(
                            ErrorKind::Reference,
                            node.pos.clone(),
                            format!("`{}` belongs to an output that is not being evaluated", name),
                        ));
                    };
                    (Rc::clone(&binding.node), bound_scope)
                }

                _ => return Ok((node, scope)),
            };
            node = next;
            scope = next_scope;
        }

        Err(RecipeError::new(
            ErrorKind::Limit,
            node.pos.clone(),
            format!("gave up after {} indirections", MAX_UNWRAP_STEPS),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EvalConfig;
    use crate::core::parser::parse;

    fn resolve(src: &str) -> RecipeResult<NodeRef> {
        let config = EvalConfig::new(std::env::temp_dir().join("paccat-resolver-tests"));
        let evaluator = Evaluator::new(&config);
        let node = parse("t.pc", src)?;
        evaluator.unwrap(&node, &Scope::new()).map(|(n, _)| n)
    }

    #[test]
    fn test_pc006_import_path_relative() {
        assert_eq!(
            import_path("recipes/main.pc", "./lib.pc"),
            PathBuf::from("recipes/./lib.pc")
        );
        assert_eq!(import_path("main.pc", "/abs/x.pc"), PathBuf::from("/abs/x.pc"));
    }

    #[test]
    fn test_pc006_call_resolves_to_body() {
        let node = resolve("((x) -> $x)(x=\"v\")").unwrap();
        assert_eq!(node.name(), "string");
    }

    #[test]
    fn test_pc006_non_indirection_unchanged() {
        assert_eq!(resolve("{a = 1}").unwrap().name(), "dict");
    }

    #[test]
    fn test_pc006_missing_parameter() {
        let e = resolve("((x, y) -> $x)(x=1)").unwrap_err();
        assert_eq!(e.kind, ErrorKind::Argument);
        assert_eq!(e.message, "lambda called without parameter `y`");
    }

    #[test]
    fn test_pc006_unknown_argument() {
        let e = resolve("((x) -> $x)(x=1, z=2)").unwrap_err();
        assert_eq!(e.kind, ErrorKind::Argument);
        assert_eq!(e.message, "lambda has no parameter `z`");
    }

    #[test]
    fn test_pc006_call_non_lambda() {
        let e = resolve("{a = 1}(a=1)").unwrap_err();
        assert_eq!(e.kind, ErrorKind::Cast);
        assert_eq!(e.message, "unable to call dict");
    }

    #[test]
    fn test_pc006_reference_suggestion() {
        let e = resolve("((foo) -> $fo0)(foo=1)").unwrap_err();
        assert_eq!(e.kind, ErrorKind::Reference);
        assert_eq!(
            e.message,
            "`fo0` is not defined in current scope, do you mean `foo`?"
        );
    }

    #[test]
    fn test_pc006_reference_no_suggestion_beyond_threshold() {
        let e = resolve("((foo) -> $completely)(foo=1)").unwrap_err();
        assert_eq!(e.message, "`completely` is not defined in current scope");
    }

    #[test]
    fn test_pc006_import_has_empty_scope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.pc"), "$secret").unwrap();
        let main = dir.path().join("main.pc");
        let config = EvalConfig::new(dir.path().join("cache"));
        let evaluator = Evaluator::new(&config);
        let node = parse(
            &main.display().to_string(),
            "((secret) -> import ./lib.pc)(secret=\"x\")",
        )
        .unwrap();
        let e = evaluator.unwrap(&node, &Scope::new()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Reference);
    }
}
