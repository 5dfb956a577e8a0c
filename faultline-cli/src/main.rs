//! Faultline CLI -- replays failure plans against a system under test
//!
//! Every subcommand renders through [`output::OutputWriter`] and reports
//! failure through [`error::CliError::exit_code`]. Trial-running commands
//! stop on SIGINT/SIGTERM after healing faults and running cleanup.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use faultline_core::config::FaultlineConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let loaded = FaultlineConfig::load_or_default(&cli.config).await;

    // A broken file still gets default logging; `config validate` reports the error.
    let mut general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(format!("{e:#}")))?;

    tracing::debug!(config = %cli.config.display(), "faultline starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Plan(args) => commands::plan::execute(args, &loaded?, &writer).await,
        Commands::Replay(args) => {
            commands::replay::execute(args, &loaded?, &writer, cancel_on_signal()).await
        }
        Commands::Campaign(args) => {
            commands::campaign::execute(args, &loaded?, &writer, cancel_on_signal()).await
        }
        Commands::Select(args) => {
            commands::select::execute(args, &loaded?, &writer, cancel_on_signal()).await
        }
    }
}

/// Spawn a listener that cancels the returned token on the first shutdown signal.
///
/// Only trial-running commands install it, so the other commands keep the
/// default signal behaviour.
fn cancel_on_signal() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => {
                tracing::warn!(signal, "shutdown requested, stopping after current trial cleanup");
                token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for shutdown signals"),
        }
    });
    cancel
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
