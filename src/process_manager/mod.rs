//! Process manager integration for the `lms` command-line tool.
//!
//! LM Studio's `lms` owns the model lifecycle. This module wraps the handful
//! of subcommands we need:
//! - `server status --json` for reachability (with an HTTP fallback)
//! - `ps --json` / `ps` for loaded models
//! - `ls` for models on disk
//! - `load <model>` to bring a model into memory
//!
//! Every invocation is an argv array with a per-operation timeout; nothing
//! is passed through a shell.

pub mod errors;
pub mod ps_parser;
pub mod registry;
pub mod runner;
pub mod status;
pub mod types;

pub use errors::ProcessError;
pub use registry::ModelRegistry;
pub use runner::{ProcessManager, ProcessOutput};
pub use status::ServerStatusProbe;
pub use types::{LoadOutcome, ModelRecord, ServerStatus};
