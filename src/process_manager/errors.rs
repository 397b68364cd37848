//! Process manager error types.

use thiserror::Error;

/// Errors from invoking the external process manager (`lms`).
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started (missing, not executable, …).
    #[error("failed to start `{command}`: {reason}")]
    SpawnFailed { command: String, reason: String },

    /// The process ran but reported failure.
    #[error("`{command}` exited with {}{}", describe_code(*code), stderr_suffix(stderr))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process did not finish within its operation timeout and was killed.
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// Waiting for the process or collecting its output failed.
    #[error("I/O error while running `{command}`: {reason}")]
    Io { command: String, reason: String },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_display_includes_stderr() {
        let err = ProcessError::NonZeroExit {
            command: "lms load x".into(),
            code: Some(1),
            stderr: "model not found\n".into(),
        };
        assert_eq!(err.to_string(), "`lms load x` exited with status 1: model not found");
    }

    #[test]
    fn test_non_zero_exit_display_without_stderr() {
        let err = ProcessError::NonZeroExit {
            command: "lms ps".into(),
            code: None,
            stderr: "  ".into(),
        };
        assert_eq!(err.to_string(), "`lms ps` exited with a signal");
    }

    #[test]
    fn test_timeout_display() {
        let err = ProcessError::Timeout {
            command: "lms load big".into(),
            secs: 120,
        };
        assert!(err.to_string().contains("120s"));
    }
}
