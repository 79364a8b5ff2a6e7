//! PC-012: Script execution transport.

pub mod local;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status of a build script.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Shared flag that asks a running build script to be killed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
