pub mod cli;
pub mod config;
pub mod guard;
pub mod inference;
pub mod process_manager;

#[cfg(test)]
mod test_support;

use std::sync::Once;

/// Environment variable holding an `EnvFilter` directive, e.g. `lmsp=trace`.
pub const LOG_ENV_VAR: &str = "LMSP_LOG";

static INIT_TRACING: Once = Once::new();

/// Initialize the tracing subscriber, writing logs to stderr.
///
/// Stdout carries only the model's reply, so every diagnostic goes to
/// stderr. Safe to call more than once; only the first call installs.
pub fn init_tracing(verbose: bool) {
    INIT_TRACING.call_once(|| install_subscriber(verbose));
}

fn install_subscriber(verbose: bool) {
    use tracing_subscriber::fmt;

    let filter = log_filter(verbose, std::env::var(LOG_ENV_VAR).ok().as_deref());

    let result = if verbose {
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .try_init()
    } else {
        // Message only, like a plain CLI warning.
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_level(false)
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "lmsp starting"
        );
    }
}

/// `LMSP_LOG` when it parses, otherwise `lmsp=debug` (verbose) or `warn`.
fn log_filter(verbose: bool, from_env: Option<&str>) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    from_env
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "lmsp=debug,warn" } else { "warn" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_defaults() {
        assert!(log_filter(true, None).to_string().contains("lmsp=debug"));
        assert!(!log_filter(false, None).to_string().contains("lmsp"));
    }

    #[test]
    fn test_log_filter_env_override() {
        assert!(log_filter(false, Some("lmsp=trace")).to_string().contains("lmsp=trace"));
        // An unparsable directive falls back to the default.
        assert!(log_filter(true, Some("lmsp=[")).to_string().contains("lmsp=debug"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
    }
}
