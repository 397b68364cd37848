//! Prompt exchange error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Each kind is a
//! separate variant so callers branch on [`PromptError::kind`] instead of
//! matching message text; [`PromptError::user_message`] renders the text the
//! CLI shows.

use thiserror::Error;

use crate::guard::ValidationError;

/// Prefix on every user-facing error message.
pub const ERROR_PREFIX: &str = "Error: ";

/// Errors that can occur while sending a prompt.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Prompt, model name, port or payload rejected by the input guard.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// TCP/HTTP connection to the server failed.
    #[error("cannot reach server at {endpoint}: {reason}")]
    ServerUnreachable { endpoint: String, reason: String },

    /// The exchange did not finish within the request timeout.
    #[error("request timed out after {duration_secs}s")]
    RequestTimeout { duration_secs: u64 },

    /// Non-2xx HTTP response.
    #[error("server returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The connection closed before the completion sentinel arrived.
    #[error("response stream ended early after {received_fragments} fragment(s)")]
    StreamTruncated { received_fragments: usize },

    /// No model was specified and none is loaded.
    #[error("no models loaded")]
    NoModelLoaded,

    /// A non-streaming response body did not have the expected shape.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// Configuration file could not be read or parsed.
    #[error("config error: {reason}")]
    Config { reason: String },
}

/// Discriminant of [`PromptError`], for callers that only need the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    ServerUnreachable,
    RequestTimeout,
    HttpStatus,
    StreamTruncated,
    NoModelLoaded,
    MalformedResponse,
    Config,
}

impl PromptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PromptError::Validation(_) => ErrorKind::Validation,
            PromptError::ServerUnreachable { .. } => ErrorKind::ServerUnreachable,
            PromptError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            PromptError::HttpStatus { .. } => ErrorKind::HttpStatus,
            PromptError::StreamTruncated { .. } => ErrorKind::StreamTruncated,
            PromptError::NoModelLoaded => ErrorKind::NoModelLoaded,
            PromptError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            PromptError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Actionable message for the terminal, always starting with [`ERROR_PREFIX`].
    pub fn user_message(&self) -> String {
        match self {
            PromptError::ServerUnreachable { endpoint, .. } => format!(
                "{ERROR_PREFIX}Could not connect to LM Studio server at {endpoint}. \
                 Make sure it's running with 'lms server start'"
            ),
            PromptError::NoModelLoaded => format!(
                "{ERROR_PREFIX}No models loaded. Use 'lms load <model>' to load a model."
            ),
            PromptError::RequestTimeout { duration_secs } => {
                format!("{ERROR_PREFIX}Request timed out after {duration_secs}s")
            }
            other => format!("{ERROR_PREFIX}{other}"),
        }
    }
}
