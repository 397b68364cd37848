//! Subprocess invocation for the process manager.
//!
//! Every call spawns the tool directly from an argv array (never through a
//! shell), captures stdout/stderr, and is bounded by an operation-specific
//! timeout. A child that outlives its timeout is killed and reaped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::errors::ProcessError;

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// `server status` queries.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// `ps` and `ls` queries.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// `load`, which may have to read gigabytes of weights from disk.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Default process manager executable.
pub const DEFAULT_TOOL: &str = "lms";

// ─── ProcessOutput ───────────────────────────────────────────────────────────

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

// ─── ProcessManager ──────────────────────────────────────────────────────────

/// Handle to the external process manager executable.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    program: PathBuf,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl ProcessManager {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path or name of the executable being invoked.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run the tool with `args` and wait at most `timeout`.
    ///
    /// A non-zero exit is *not* an error here; callers inspect
    /// [`ProcessOutput::success`] or use [`ProcessManager::run_checked`].
    pub async fn run(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let command = self.describe(args);
        tracing::debug!(
            command = %command,
            timeout_secs = timeout.as_secs(),
            "running process manager"
        );

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProcessError::Io {
                    command,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(command = %command, "process manager timed out, killed");
                return Err(ProcessError::Timeout {
                    command,
                    secs: timeout.as_secs(),
                });
            }
        };

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            command = %command,
            code = ?result.code,
            stdout = %truncate_for_log(&result.stdout),
            "process manager finished"
        );

        Ok(result)
    }

    /// Like [`ProcessManager::run`], but a non-zero exit becomes
    /// [`ProcessError::NonZeroExit`].
    pub async fn run_checked(
        &self,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let output = self.run(args, timeout).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ProcessError::NonZeroExit {
                command: self.describe(args),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut command = self.program.display().to_string();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }
}

/// Keep log lines readable: first 200 chars of tool output.
fn truncate_for_log(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...(truncated)", &text[..idx]),
        None => text.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
