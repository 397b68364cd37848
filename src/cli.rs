//! Command-line front end.
//!
//! Parses arguments, combines the prompt with piped input, checks the server
//! and the requested model, then hands the prompt to [`PromptClient`]. All
//! terminal output happens here; the library modules only log.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{CommandFactory, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{load_or_default, ClientConfig};
use crate::guard::{sanitize_terminal_output, validate_port};
use crate::inference::{PromptClient, PromptError, PromptRequest, Stats};
use crate::process_manager::{LoadOutcome, ModelRegistry, ServerStatusProbe};

/// Exit status for success.
pub const EXIT_OK: u8 = 0;

/// Exit status for any reported failure.
pub const EXIT_FAILURE: u8 = 1;

/// Shown next to the spinner while a silent request is in flight.
const PROGRESS_TEXT: &str = "Generating…";

const SPINNER_TICK: Duration = Duration::from_millis(100);

/// Send prompts to LM Studio loaded models.
#[derive(Debug, Parser)]
#[command(name = "lmsp", version, about = "Send prompts to LM Studio loaded models")]
pub struct Cli {
    /// The prompt to send to the model
    pub prompt: Option<String>,

    /// Model to use (default: first loaded model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// LM Studio server port [default: 1234]
    #[arg(short, long, value_parser = parse_port)]
    pub port: Option<u16>,

    /// How to combine piped input with the prompt
    #[arg(long, value_enum, default_value_t = PipeMode::Replace)]
    pub pipe_mode: PipeMode,

    /// Wait for the complete response instead of printing it as it arrives
    #[arg(short = 'w', long)]
    pub no_stream: bool,

    /// Print timing statistics to stderr
    #[arg(short, long)]
    pub stats: bool,

    /// Script-friendly output: no progress indicator, key=value statistics
    #[arg(long)]
    pub plain: bool,

    /// List currently loaded models
    #[arg(long)]
    pub list_models: bool,

    /// Check if the LM Studio server is running
    #[arg(long)]
    pub check_server: bool,

    /// Enable verbose logging for debugging
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file [default: <config dir>/lmsp/config.yaml]
    #[arg(long, env = "LMSP_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Process manager executable [default: lms]
    #[arg(long, value_name = "PATH")]
    pub tool: Option<String>,
}

/// How piped stdin is combined with the prompt argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PipeMode {
    /// Use piped input only when no prompt is given
    #[default]
    Replace,
    /// Prompt first, then piped input
    Append,
    /// Piped input first, then the prompt
    Prepend,
}

fn parse_port(raw: &str) -> Result<u16, String> {
    let port: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a port number"))?;
    validate_port(port).map_err(|e| e.to_string())
}

/// Combine the prompt argument with piped input.
///
/// Piped input is trimmed first. When both are present the parts are joined
/// by a blank line; `Replace` only replaces a missing prompt and otherwise
/// behaves like `Append`. Returns `None` when there is nothing to send.
pub fn compose_prompt(prompt: Option<&str>, piped: Option<&str>, mode: PipeMode) -> Option<String> {
    let prompt = prompt.filter(|p| !p.is_empty());
    let piped = piped.map(str::trim).filter(|p| !p.is_empty());

    let combined = match (prompt, piped) {
        (None, None) => return None,
        (Some(prompt), None) => prompt.to_string(),
        (None, Some(piped)) => piped.to_string(),
        (Some(prompt), Some(piped)) => match mode {
            PipeMode::Prepend => format!("{piped}\n\n{prompt}"),
            PipeMode::Append | PipeMode::Replace => format!("{prompt}\n\n{piped}"),
        },
    };
    Some(combined)
}

/// Apply file config, then command-line overrides.
pub fn resolve_config(cli: &Cli) -> Result<ClientConfig, PromptError> {
    let mut config = load_or_default(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref tool) = cli.tool {
        config.process_manager = tool.clone();
    }
    Ok(config)
}

/// Run one invocation and return the process exit status.
///
/// `piped` is the raw stdin content when stdin was not a terminal.
/// `show_progress` says whether stderr is a terminal. Only write failures
/// on `out`/`err` are returned as errors; everything else is reported on
/// `err` and turned into [`EXIT_FAILURE`].
pub async fn run<O: Write, E: Write>(
    cli: &Cli,
    piped: Option<&str>,
    out: &mut O,
    err: &mut E,
    show_progress: bool,
) -> io::Result<u8> {
    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(e) => return report(err, &e),
    };
    tracing::debug!(?config, "resolved config");

    let pm = config.process_manager();
    let registry = ModelRegistry::new(pm.clone());
    let probe = ServerStatusProbe::new(pm, config.host.clone(), config.port);

    if cli.list_models {
        let models = registry.list_loaded().await;
        if models.is_empty() {
            writeln!(out, "No models currently loaded")?;
        } else {
            writeln!(out, "Loaded models:")?;
            for model in &models {
                writeln!(out, "  - {}", sanitize_terminal_output(&model.identifier))?;
            }
        }
        return Ok(EXIT_OK);
    }

    if cli.check_server {
        let status = probe.check().await;
        if status.running {
            let port = status.port.unwrap_or(config.port);
            writeln!(out, "LM Studio server is running on port {port}")?;
        } else {
            writeln!(out, "LM Studio server is not running")?;
        }
        return Ok(EXIT_OK);
    }

    let Some(prompt) = compose_prompt(cli.prompt.as_deref(), piped, cli.pipe_mode) else {
        write!(out, "{}", Cli::command().render_help())?;
        return Ok(EXIT_OK);
    };

    if !probe.check().await.running {
        writeln!(
            err,
            "Error: LM Studio server is not running. Start it with 'lms server start'"
        )?;
        return Ok(EXIT_FAILURE);
    }

    // A display name resolves to the loaded model's identifier.
    let mut model = cli.model.clone();
    if let Some(ref requested) = cli.model {
        tracing::info!(model = %requested, "ensuring model is loaded");
        match registry.ensure_loaded(requested).await {
            LoadOutcome::Failed {
                reason, available, ..
            } => {
                writeln!(
                    err,
                    "Error: Failed to load model '{}': {}",
                    sanitize_terminal_output(requested),
                    sanitize_terminal_output(&reason)
                )?;
                if !available.is_empty() {
                    writeln!(err, "Available models:")?;
                    for name in &available {
                        writeln!(err, "  - {}", sanitize_terminal_output(name))?;
                    }
                }
                return Ok(EXIT_FAILURE);
            }
            outcome => model = outcome.identifier().map(str::to_string),
        }
    }

    let client = match PromptClient::new(&config, registry) {
        Ok(client) => client,
        Err(e) => return report(err, &e),
    };

    let request = PromptRequest {
        prompt,
        model,
        live_echo: !cli.no_stream,
        collect_stats: cli.stats,
    };

    let spinner = progress_spinner(wants_progress(cli, show_progress));
    let mut echo = CountingWriter::new(&mut *out);
    let result = client.send(&request, &mut echo).await;
    let echoed = echo.written > 0;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(reply) => {
            if request.live_echo {
                writeln!(out)?;
            } else {
                writeln!(out, "{}", sanitize_terminal_output(&reply.text))?;
            }
            out.flush()?;
            if let Some(ref stats) = reply.stats {
                print_stats(err, stats, cli.plain)?;
            }
            Ok(EXIT_OK)
        }
        Err(e) => {
            if echoed {
                // Terminate the partially echoed line.
                writeln!(out)?;
            }
            report(err, &e)
        }
    }
}

/// The spinner only makes sense for a silent request on an interactive
/// stderr, and never in plain mode.
fn wants_progress(cli: &Cli, stderr_is_terminal: bool) -> bool {
    stderr_is_terminal && cli.no_stream && !cli.plain
}

/// A spinner drawn on stderr, or `None` when disabled.
fn progress_spinner(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(PROGRESS_TEXT);
    pb.enable_steady_tick(SPINNER_TICK);
    Some(pb)
}

/// Passes writes through and remembers how many bytes went out.
struct CountingWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn print_stats<E: Write>(err: &mut E, stats: &Stats, plain: bool) -> io::Result<()> {
    if plain {
        writeln!(err, "{}", stats.to_plain())
    } else {
        writeln!(err)?;
        writeln!(err, "{stats}")
    }
}

fn report<E: Write>(err: &mut E, error: &PromptError) -> io::Result<u8> {
    tracing::debug!(kind = ?error.kind(), error = %error, "prompt failed");
    writeln!(err, "{}", error.user_message())?;
    Ok(EXIT_FAILURE)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
