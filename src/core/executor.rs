//! PC-008: Output cache and build executor.
//!
//! An output is stored at `<cache_dir>/<structural hash>`. An existing entry
//! is reused unless `always` is truthy or the configuration forces a rebuild;
//! otherwise the script runs through the shell in a fresh working directory
//! with `out` set to the entry's path.

use super::ast::{LiteralMap, Node, NodeKind, NodeRef};
use super::error::{ErrorKind, RecipeError, RecipeResult};
use super::evaluator::Evaluator;
use super::scope::{Frame, Scope};
use super::types::{BuildEvent, Position};
use super::value::Value;
use crate::store::{eventlog, hasher};
use crate::transport::local::{self, ExecRequest};
use indexmap::IndexMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

/// Options with a meaning to the executor. Undeclared ones are masked so a
/// nested output never sees its parent's.
pub const RESERVED_OPTIONS: [&str; 4] = ["script", "depends", "exports", "always"];

/// Everything a build needs once options are bound.
struct OutputPlan<'n> {
    node: &'n NodeRef,
    declared: Option<&'n LiteralMap>,
    script: NodeRef,
    scope: Scope,
    key: String,
    path: String,
}

/// Build script environment: `base`, each dependency's exports folded in as
/// `NAME=prev:dep/value`, then `out`.
pub fn build_environment(
    base: &IndexMap<String, String>,
    depends: Option<&Rc<Value>>,
    out: &str,
) -> IndexMap<String, String> {
    let mut env = base.clone();
    if let Some(depends) = depends {
        for (word, dep) in depends.words() {
            for (name, attr) in &dep.attributes {
                let contribution = format!("{}/{}", word, attr.value.content);
                match env.get_mut(name) {
                    Some(prev) if !prev.is_empty() => {
                        prev.push(':');
                        prev.push_str(&contribution);
                    }
                    _ => {
                        env.insert(name.clone(), contribution);
                    }
                }
            }
        }
    }
    env.insert("out".to_string(), out.to_string());
    env
}

/// Remove a file, symlink or directory tree. Missing paths are fine.
pub fn remove_output(path: &Path) -> Result<(), String> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| format!("cannot remove {}: {}", path.display(), e))
}

fn output_value(path: &str, exports: Option<Rc<Value>>) -> Rc<Value> {
    let mut value = Value::text("output", path);
    if let Some(exports) = exports {
        value.attributes = exports.attributes.clone();
    }
    Rc::new(value)
}

impl Evaluator<'_> {
    pub(super) fn output(
        &self,
        node: &NodeRef,
        options: &NodeRef,
        scope: &Scope,
    ) -> RecipeResult<Rc<Value>> {
        let declared = match &options.kind {
            NodeKind::Dict(map) => Some(map),
            _ => None,
        };

        // Options resolve in this frame for as long as the output is evaluated.
        let frame = Frame::new();
        let mut inner = scope.clone();
        for name in RESERVED_OPTIONS {
            if declared.is_none_or(|m| !m.contains(name)) {
                inner = inner.without(name);
            }
        }

        let script = match declared {
            Some(map) => {
                for (name, entry) in map.iter() {
                    if let Some(value) = &entry.value {
                        inner = inner.set_in_frame(name, Rc::clone(value), &frame);
                    }
                }
                match map.get("script").and_then(|e| e.value.clone()) {
                    Some(script) => script,
                    None => {
                        return Err(RecipeError::new(
                            ErrorKind::Attribute,
                            node.pos.clone(),
                            "output requires field `script`",
                        ))
                    }
                }
            }
            None => Rc::clone(options),
        };

        let key = node.structural_hash();
        let path = self.config.cache_dir.join(&key).display().to_string();
        inner = inner.set("out", Node::literal(Position::synthetic(&path), path.as_str()), None);
        frame.close(inner.clone());

        let plan = OutputPlan {
            node,
            declared,
            script,
            scope: inner,
            key,
            path,
        };

        let path = Path::new(&plan.path);
        if std::fs::symlink_metadata(path).is_ok() {
            let always = self
                .option(&plan, "always")?
                .is_some_and(|v| v.is_truthy());
            if !always && !self.config.force {
                tracing::debug!("reusing {}", plan.path);
                self.record(BuildEvent::BuildReused {
                    key: plan.key.clone(),
                    path: plan.path.clone(),
                });
                let exports = self.option(&plan, "exports")?;
                return Ok(output_value(&plan.path, exports));
            }
            tracing::warn!("removing stale output {}", plan.path);
            remove_output(path).map_err(|e| RecipeError::new(ErrorKind::Io, node.pos.clone(), e))?;
        }

        self.build(&plan)
    }

    /// Evaluate a declared option in the output's scope.
    fn option(&self, plan: &OutputPlan<'_>, name: &str) -> RecipeResult<Option<Rc<Value>>> {
        let Some(entry) = plan.declared.and_then(|m| m.get(name)) else {
            return Ok(None);
        };
        let Some(value) = &entry.value else {
            return Ok(None);
        };
        self.evaluate(value, &plan.scope)
            .map(Some)
            .map_err(|e| e.wrap(&entry.key.pos, format!("while evaluating output option `{}`", name)))
    }

    fn build(&self, plan: &OutputPlan<'_>) -> RecipeResult<Rc<Value>> {
        let started = Instant::now();
        self.record(BuildEvent::BuildStarted {
            key: plan.key.clone(),
            path: plan.path.clone(),
            source: plan.node.pos.to_string(),
        });

        match self.run_build(plan) {
            Ok(value) => {
                let content_hash = hasher::hash_output(Path::new(&plan.path)).unwrap_or_else(|e| {
                    tracing::warn!("cannot hash {}: {}", plan.path, e);
                    None
                });
                let duration = started.elapsed().as_secs_f64();
                tracing::info!("built {} in {:.2}s", plan.path, duration);
                self.record(BuildEvent::BuildCompleted {
                    key: plan.key.clone(),
                    path: plan.path.clone(),
                    duration_seconds: duration,
                    content_hash,
                });
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = remove_output(Path::new(&plan.path)) {
                    tracing::warn!("{}", e);
                } else {
                    tracing::debug!("discarded partial output {}", plan.path);
                }
                self.record(BuildEvent::BuildFailed {
                    key: plan.key.clone(),
                    path: plan.path.clone(),
                    error: err.root().message.clone(),
                });
                Err(err)
            }
        }
    }

    fn run_build(&self, plan: &OutputPlan<'_>) -> RecipeResult<Rc<Value>> {
        let pos = &plan.node.pos;
        std::fs::create_dir_all(&self.config.cache_dir)
            .map_err(|e| RecipeError::foreign(ErrorKind::Io, pos.clone(), "cannot create cache dir", e))?;
        let workdir = tempfile::Builder::new()
            .prefix("paccat-workdir-")
            .tempdir()
            .map_err(|e| RecipeError::foreign(ErrorKind::Io, pos.clone(), "cannot create working directory", e))?;

        let exports = self.option(plan, "exports")?;
        let depends = self.option(plan, "depends")?;
        let env = build_environment(&self.config.environment, depends.as_ref(), &plan.path);

        let script = self
            .evaluate(&plan.script, &plan.scope)
            .map_err(|e| e.wrap(pos, "while evaluating output script"))?;

        tracing::debug!("running build script for {} in {}", plan.key, workdir.path().display());
        let status = local::exec_local(&ExecRequest {
            shell: &self.config.shell,
            script: &script.content,
            workdir: workdir.path(),
            env: &env,
            cancel: &self.config.cancel,
        })
        .map_err(|e| RecipeError::new(ErrorKind::Build, pos.clone(), e))?;

        if !status.success() {
            return Err(RecipeError::new(
                ErrorKind::Build,
                pos.clone(),
                format!("build script exited with code {}", status.exit_code),
            ));
        }
        Ok(output_value(&plan.path, exports))
    }

    fn record(&self, event: BuildEvent) {
        if !self.config.event_log {
            return;
        }
        if let Err(e) = eventlog::append_event(&self.config.cache_dir, event) {
            tracing::warn!("cannot record build event: {}", e);
        }
    }
}
