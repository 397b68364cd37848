use std::io::{IsTerminal, Read};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use lmsp::cli::{self, Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    lmsp::init_tracing(cli.verbose);

    let piped = read_piped_stdin().context("failed to read piped input")?;

    let mut out = std::io::stdout();
    let mut err = std::io::stderr();
    let show_progress = err.is_terminal();

    let code = cli::run(&cli, piped.as_deref(), &mut out, &mut err, show_progress)
        .await
        .context("failed to write output")?;

    Ok(ExitCode::from(code))
}

/// Whole stdin when it is a pipe or file, `None` on an interactive terminal.
fn read_piped_stdin() -> std::io::Result<Option<String>> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buf = Vec::new();
    stdin.read_to_end(&mut buf)?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
