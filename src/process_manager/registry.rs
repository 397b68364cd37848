//! Model registry: what is loaded, what could be loaded, and loading on demand.
//!
//! All queries go through the process manager. None of them fail: a broken
//! or missing tool degrades to "nothing loaded" / "nothing available", and
//! load failures are reported through [`LoadOutcome`].

use crate::guard::{safe_json_from_str, validate_model_name};

use super::ps_parser::parse_plain_ps;
use super::runner::{ProcessManager, LIST_TIMEOUT, LOAD_TIMEOUT};
use super::types::{LoadOutcome, ModelRecord, RawModelRecord};

/// Upper bound on process-manager JSON output (1 MiB).
const MAX_TOOL_OUTPUT_BYTES: usize = 1024 * 1024;

/// Error text fragments meaning the requested model does not exist.
const UNKNOWN_MODEL_MARKERS: &[&str] =
    &["not found", "does not exist", "no model", "unknown model"];

/// Queries and loads models through the process manager.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    pm: ProcessManager,
}

impl ModelRegistry {
    pub fn new(pm: ProcessManager) -> Self {
        Self { pm }
    }

    /// Models currently loaded into memory.
    ///
    /// Tries `ps --json` first, then the plain-text `ps` table.
    pub async fn list_loaded(&self) -> Vec<ModelRecord> {
        match self.pm.run(&["ps", "--json"], LIST_TIMEOUT).await {
            Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
                match parse_loaded_json(&out.stdout) {
                    Ok(models) => {
                        tracing::info!(count = models.len(), "found loaded models");
                        return models;
                    }
                    Err(e) => tracing::debug!(error = %e, "ps --json output unusable"),
                }
            }
            Ok(out) => tracing::debug!(code = ?out.code, "ps --json failed"),
            Err(e) => tracing::debug!(error = %e, "ps --json failed"),
        }

        tracing::debug!("falling back to plain-text ps");
        match self.pm.run(&["ps"], LIST_TIMEOUT).await {
            Ok(out) if out.success() => match parse_plain_ps(&out.stdout) {
                Some(model) => {
                    tracing::info!(model = %model.identifier, "found model in ps table");
                    vec![model]
                }
                None => {
                    tracing::warn!("no models found");
                    Vec::new()
                }
            },
            Ok(out) => {
                tracing::warn!(code = ?out.code, "ps failed, assuming no models loaded");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "ps failed, assuming no models loaded");
                Vec::new()
            }
        }
    }

    /// Models on disk that can be loaded, in the tool's own order.
    pub async fn list_available(&self) -> Vec<String> {
        match self.pm.run_checked(&["ls"], LIST_TIMEOUT).await {
            Ok(out) => {
                let models: Vec<String> = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                tracing::info!(count = models.len(), "found available models");
                models
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not list available models");
                Vec::new()
            }
        }
    }

    /// Make sure `name` is loaded, loading it if necessary.
    ///
    /// `name` may be an identifier or a display name of a loaded model.
    /// Idempotent: when the model is already loaded nothing beyond the
    /// listing query is invoked. Only a name that is actually passed to
    /// `load` has to satisfy [`validate_model_name`].
    pub async fn ensure_loaded(&self, name: &str) -> LoadOutcome {
        let loaded = self.list_loaded().await;
        if let Some(model) = loaded.into_iter().find(|m| m.matches(name)) {
            tracing::info!(
                model = name,
                identifier = %model.identifier,
                "model already loaded"
            );
            return LoadOutcome::AlreadyLoaded {
                identifier: model.identifier,
            };
        }

        if let Err(e) = validate_model_name(name) {
            tracing::warn!(error = %e, "refusing to load model");
            return LoadOutcome::Failed {
                reason: e.to_string(),
                unknown_model: false,
                available: Vec::new(),
            };
        }

        tracing::info!(model = name, "model not loaded, loading");
        let output = match self.pm.run(&["load", name], LOAD_TIMEOUT).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(model = name, error = %e, "failed to load model");
                return LoadOutcome::Failed {
                    reason: e.to_string(),
                    unknown_model: false,
                    available: Vec::new(),
                };
            }
        };

        if output.success() {
            tracing::info!(model = name, "model loaded");
            return LoadOutcome::Loaded {
                identifier: name.to_string(),
            };
        }

        let reason = first_non_empty(&output.stderr, &output.stdout)
            .unwrap_or("load command failed")
            .to_string();
        tracing::error!(
            model = name,
            code = ?output.code,
            reason = %reason,
            "failed to load model"
        );

        let combined = format!("{}\n{}", output.stderr, output.stdout);
        let unknown_model = is_unknown_model_error(&combined);
        let available = if unknown_model {
            self.list_available().await
        } else {
            Vec::new()
        };

        LoadOutcome::Failed {
            reason,
            unknown_model,
            available,
        }
    }
}

/// Parse `ps --json` output into records, skipping entries with no key.
fn parse_loaded_json(stdout: &str) -> Result<Vec<ModelRecord>, crate::guard::ValidationError> {
    let raw: Vec<RawModelRecord> = safe_json_from_str(stdout.trim(), MAX_TOOL_OUTPUT_BYTES)?;
    Ok(raw.into_iter().filter_map(RawModelRecord::into_record).collect())
}

/// Whether process-manager error text says the model does not exist.
pub fn is_unknown_model_error(text: &str) -> bool {
    let lowered = text.to_lowercase();
    UNKNOWN_MODEL_MARKERS.iter().any(|m| lowered.contains(m))
}

fn first_non_empty<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    [a.trim(), b.trim()].into_iter().find(|s| !s.is_empty())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
