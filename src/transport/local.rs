//! PC-012: Local execution of build scripts.

use super::{CancelToken, ExecOutput};
use indexmap::IndexMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What to run and where.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    /// Shell binary; the script is fed on its standard input.
    pub shell: &'a str,
    pub script: &'a str,
    pub workdir: &'a Path,
    /// Complete environment of the child. Nothing else is inherited.
    pub env: &'a IndexMap<String, String>,
    pub cancel: &'a CancelToken,
}

/// Run a script through the shell with inherited stdout/stderr and wait for it.
/// The child is killed if the cancel token fires.
pub fn exec_local(req: &ExecRequest<'_>) -> Result<ExecOutput, String> {
    let mut child = Command::new(req.shell)
        .current_dir(req.workdir)
        .env_clear()
        .envs(req.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", req.shell, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(req.script.as_bytes()) {
            // The shell may exit before reading everything.
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("stdin write error: {}", e));
            }
        }
    }

    loop {
        if req.cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err("build cancelled".to_string());
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(ExecOutput {
                    exit_code: status.code().unwrap_or(-1),
                })
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(format!("wait error: {}", e)),
        }
    }
}
