//! Client configuration loading.
//!
//! Reads an optional YAML file (`~/.config/lmsp/config.yaml` by default) and
//! resolves environment variables in it. Every field has a default, so a
//! missing file simply means "talk to `lms` and localhost:1234".

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::guard::validate_port;
use crate::inference::errors::PromptError;
use crate::inference::types::{MaxTokens, DEFAULT_TEMPERATURE};
use crate::process_manager::runner::DEFAULT_TOOL;
use crate::process_manager::ProcessManager;

/// Default LM Studio server port.
pub const DEFAULT_PORT: u16 = 1234;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime configuration for one invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Process manager executable (name on `PATH` or absolute path).
    pub process_manager: String,
    pub host: String,
    pub port: u16,
    pub temperature: f32,
    /// `None` means no limit.
    pub max_tokens: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            process_manager: DEFAULT_TOOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl ClientConfig {
    /// `http://host:port`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn max_tokens(&self) -> MaxTokens {
        self.max_tokens.into()
    }

    pub fn process_manager(&self) -> ProcessManager {
        ProcessManager::new(expand_tilde(&self.process_manager))
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// `<config dir>/lmsp/config.yaml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lmsp").join("config.yaml"))
}

/// Load the explicit config file, or the default one if it exists, or defaults.
///
/// An explicitly named file that does not exist is an error.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ClientConfig, PromptError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(ClientConfig::default()),
    }
}

/// Load and parse a config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_config(path: &Path) -> Result<ClientConfig, PromptError> {
    let raw = std::fs::read_to_string(path).map_err(|e| PromptError::Config {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config = parse_config(&raw)?;
    tracing::debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

/// Parse config YAML. An empty document yields the defaults.
pub fn parse_config(raw: &str) -> Result<ClientConfig, PromptError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(ClientConfig::default());
    }

    let config: ClientConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| PromptError::Config {
            reason: format!("failed to parse config: {e}"),
        })?;

    validate_port(i64::from(config.port))?;
    if config.process_manager.trim().is_empty() {
        return Err(PromptError::Config {
            reason: "process_manager must not be empty".into(),
        });
    }

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some((var_name, default)) = expr.split_once(":-") {
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
