//! PC-013: CLI subcommands (eval, check).

use crate::core::config::{self, EvalConfig};
use crate::core::error::{print_trace, RecipeError};
use crate::core::evaluator::Evaluator;
use crate::core::scope::Scope;
use crate::core::{ast, parser};
use clap::Subcommand;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a recipe and print its value
    Eval {
        /// Path to the recipe
        file: PathBuf,

        /// Print the syntax tree before evaluating
        #[arg(long)]
        ast: bool,

        /// Print which expression produced each part of the result
        #[arg(long)]
        source: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Point ./result at the evaluated path
        #[arg(long)]
        result: bool,

        /// Rebuild outputs even when cached
        #[arg(long)]
        force: bool,

        /// Cache directory (default: $PACCAT_CACHE_DIR or ~/.cache/paccat)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// YAML settings file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a recipe without evaluating it
    Check {
        /// Path to the recipe
        file: PathBuf,
    },
}

/// Flags of `paccat eval`.
#[derive(Debug, Default)]
pub struct EvalOptions {
    pub ast: bool,
    pub source: bool,
    pub json: bool,
    pub result: bool,
    pub force: bool,
    pub cache_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Eval {
            file,
            ast,
            source,
            json,
            result,
            force,
            cache_dir,
            config,
        } => {
            let opts = EvalOptions {
                ast,
                source,
                json,
                result,
                force,
                cache_dir,
                config,
            };
            let base = EvalConfig::from_process();
            let stdout = std::io::stdout();
            cmd_eval(&file, &opts, base, &mut stdout.lock())
        }
        Commands::Check { file } => {
            let stdout = std::io::stdout();
            cmd_check(&file, &mut stdout.lock())
        }
    }
}

/// Layer settings file and flags over the process configuration.
pub fn build_config(opts: &EvalOptions, mut config: EvalConfig) -> Result<EvalConfig, String> {
    if let Some(path) = &opts.config {
        let settings = config::load_settings(path)?;
        config.apply_settings(&settings);
    }
    if let Some(dir) = &opts.cache_dir {
        config.cache_dir.clone_from(dir);
    }
    config.force = opts.force;
    Ok(config)
}

/// Print the diagnostic trace and condense the error for `main`.
fn report(err: &RecipeError) -> String {
    let stderr = std::io::stderr();
    let _ = print_trace(&mut stderr.lock(), err);
    format!("{} frame(s) in trace", err.chain().count())
}

fn io_err(e: std::io::Error) -> String {
    format!("cannot write output: {}", e)
}

pub fn cmd_eval<W: Write>(
    file: &Path,
    opts: &EvalOptions,
    base: EvalConfig,
    out: &mut W,
) -> Result<(), String> {
    let config = build_config(opts, base)?;
    let node = parser::parse_file(file).map_err(|e| report(&e))?;

    if opts.ast {
        ast::print_tree(out, &node, 0).map_err(io_err)?;
    }

    tracing::debug!("evaluating {} with cache {}", file.display(), config.cache_dir.display());
    let value = Evaluator::new(&config)
        .evaluate(&node, &Scope::new())
        .map_err(|e| report(&e))?;

    if opts.json {
        let text = serde_json::to_string_pretty(&value.to_json())
            .map_err(|e| format!("JSON error: {}", e))?;
        writeln!(out, "{}", text).map_err(io_err)?;
    } else {
        writeln!(out, "{}", value.content).map_err(io_err)?;
    }

    if opts.source {
        for (start, end, origin) in value.flat_sources() {
            writeln!(out, "{}-{}: {}", start, end, origin).map_err(io_err)?;
        }
    }

    if opts.result {
        link_result(Path::new("result"), Path::new(&value.content))?;
    }
    Ok(())
}

pub fn cmd_check<W: Write>(file: &Path, out: &mut W) -> Result<(), String> {
    let node = parser::parse_file(file).map_err(|e| report(&e))?;
    writeln!(out, "OK: {} ({})", file.display(), node.structural_hash()).map_err(io_err)
}

/// Create or replace the symlink `link` pointing at `target`.
pub fn link_result(link: &Path, target: &Path) -> Result<(), String> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(link)
                .map_err(|e| format!("cannot remove {}: {}", link.display(), e))?;
        }
        Ok(_) => {
            return Err(format!(
                "{} exists and is not a symlink, refusing to replace it",
                link.display()
            ))
        }
        Err(_) => {}
    }
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| format!("cannot link {}: {}", link.display(), e))
}
