//! Types produced by the process manager queries.

use serde::Deserialize;

/// A model known to the process manager.
///
/// `identifier` is the stable lookup key; `name` is a display alias.
/// Two records with the same identifier are the same model.
#[derive(Debug, Clone, Eq)]
pub struct ModelRecord {
    pub identifier: String,
    pub name: Option<String>,
}

impl PartialEq for ModelRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl ModelRecord {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: None,
        }
    }

    /// Whether `name` refers to this model, by identifier or display name.
    pub fn matches(&self, name: &str) -> bool {
        self.identifier == name || self.name.as_deref() == Some(name)
    }
}

/// One entry of `lms ps --json`.
///
/// Only the fields we use are read; the tool emits many more. Older and
/// newer releases disagree on the key field's name, so several are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawModelRecord {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    model_key: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl RawModelRecord {
    /// Convert to a [`ModelRecord`]; `None` if the entry has no usable key.
    pub(super) fn into_record(self) -> Option<ModelRecord> {
        let identifier = self
            .identifier
            .or(self.model_key)
            .or(self.path)
            .or_else(|| self.name.clone())
            .filter(|id| !id.trim().is_empty())?;
        Some(ModelRecord {
            identifier,
            name: self.name.or(self.display_name),
        })
    }
}

/// Whether the inference server accepts requests.
///
/// Recomputed on every probe, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub port: Option<u16>,
}

impl ServerStatus {
    pub fn stopped() -> Self {
        Self::default()
    }

    pub fn running_on(port: u16) -> Self {
        Self {
            running: true,
            port: Some(port),
        }
    }
}

/// Result of [`ModelRegistry::ensure_loaded`](super::ModelRegistry::ensure_loaded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model was already loaded; nothing was invoked.
    AlreadyLoaded { identifier: String },
    /// The load command succeeded.
    Loaded { identifier: String },
    /// Loading failed.
    Failed {
        reason: String,
        /// The tool reported that the model does not exist.
        unknown_model: bool,
        /// Models that could be loaded instead (only fetched for unknown models).
        available: Vec<String>,
    },
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        self.identifier().is_some()
    }

    /// Identifier of the loaded model, which may differ from the requested
    /// name when that matched a display name.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            LoadOutcome::AlreadyLoaded { identifier } | LoadOutcome::Loaded { identifier } => {
                Some(identifier)
            }
            LoadOutcome::Failed { .. } => None,
        }
    }
}
