//! PC-009: Evaluation configuration.
//!
//! The evaluator never reads the process environment itself; everything it
//! needs arrives through [`EvalConfig`]. [`EvalConfig::from_process`] is the
//! one place ambient state is consulted.

use crate::transport::CancelToken;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Inputs of an evaluation besides the recipe itself.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Root under which outputs are stored as `<cache_dir>/<key>`.
    pub cache_dir: PathBuf,
    /// Variables build scripts inherit, before dependency and `out` overlays.
    pub environment: IndexMap<String, String>,
    /// Shell that receives build scripts on stdin.
    pub shell: String,
    /// Rebuild outputs even when a cache entry exists.
    pub force: bool,
    /// Append build events to `<cache_dir>/events.jsonl`.
    pub event_log: bool,
    pub cancel: CancelToken,
}

impl EvalConfig {
    /// A configuration with an empty environment and the default shell.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            environment: IndexMap::new(),
            shell: "sh".to_string(),
            force: false,
            event_log: true,
            cancel: CancelToken::new(),
        }
    }

    /// Configuration from the running process: its environment and cache dir.
    pub fn from_process() -> Self {
        let mut config = Self::new(default_cache_dir(|k| std::env::var(k).ok()));
        config.environment = std::env::vars().collect();
        config
    }

    /// Overlay a settings file.
    pub fn apply_settings(&mut self, settings: &Settings) {
        if let Some(dir) = &settings.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(shell) = &settings.shell {
            self.shell = shell.clone();
        }
        if let Some(event_log) = settings.event_log {
            self.event_log = event_log;
        }
        for (k, v) in &settings.env {
            self.environment.insert(k.clone(), v.clone());
        }
    }
}

/// Optional YAML settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub event_log: Option<bool>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

pub fn parse_settings(yaml: &str) -> Result<Settings, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

pub fn load_settings(path: &Path) -> Result<Settings, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    parse_settings(&content)
}

/// Resolve the cache root: `PACCAT_CACHE_DIR`, `$XDG_CACHE_HOME/paccat`,
/// `$HOME/.cache/paccat`, then the temp dir.
pub fn default_cache_dir(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |k: &str| lookup(k).filter(|v| !v.is_empty());
    if let Some(dir) = set("PACCAT_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = set("XDG_CACHE_HOME") {
        return PathBuf::from(dir).join("paccat");
    }
    if let Some(home) = set("HOME") {
        return PathBuf::from(home).join(".cache").join("paccat");
    }
    std::env::temp_dir().join("paccat")
}
