//! Server status probe.
//!
//! Asks the process manager first; if that is unavailable, falls back to a
//! direct request against the server's model-listing endpoint.

use std::time::Duration;

use reqwest::StatusCode;

use crate::guard::safe_json_from_str;

use super::runner::{ProcessManager, STATUS_TIMEOUT};
use super::types::ServerStatus;

/// Timeout for the HTTP health fallback.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on `server status --json` output.
const MAX_STATUS_BYTES: usize = 64 * 1024;

/// Determines whether the inference server is reachable.
#[derive(Debug, Clone)]
pub struct ServerStatusProbe {
    pm: ProcessManager,
    host: String,
    port: u16,
}

impl ServerStatusProbe {
    pub fn new(pm: ProcessManager, host: impl Into<String>, port: u16) -> Self {
        Self {
            pm,
            host: host.into(),
            port,
        }
    }

    /// Probe the server. Never fails; every error means "not running".
    pub async fn check(&self) -> ServerStatus {
        if let Some(status) = self.check_via_process_manager().await {
            tracing::info!(running = status.running, port = ?status.port, "server status");
            return status;
        }

        tracing::debug!("falling back to HTTP health check");
        if self.check_via_http().await {
            tracing::info!(port = self.port, "server is running");
            return ServerStatus::running_on(self.port);
        }

        tracing::warn!("server is not running");
        ServerStatus::stopped()
    }

    /// `lms server status --json`; `None` when the answer is unusable.
    async fn check_via_process_manager(&self) -> Option<ServerStatus> {
        let output = match self
            .pm
            .run(&["server", "status", "--json"], STATUS_TIMEOUT)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!(error = %e, "status query failed");
                return None;
            }
        };

        if !output.success() || output.stdout.trim().is_empty() {
            tracing::debug!(code = ?output.code, "status query returned no status");
            return None;
        }

        safe_json_from_str::<ServerStatus>(output.stdout.trim(), MAX_STATUS_BYTES)
            .map_err(|e| tracing::debug!(error = %e, "status output is not valid JSON"))
            .ok()
    }

    /// `GET /v1/models`; only HTTP 200 counts as running.
    async fn check_via_http(&self) -> bool {
        let url = format!("http://{}:{}/v1/models", self.host, self.port);

        let client = match reqwest::Client::builder().timeout(HEALTH_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!(error = %e, "HTTP client error");
                return false;
            }
        };

        match client.get(&url).send().await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "HTTP check failed");
                false
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
