//! Logging initialization for the faultline CLI.
//!
//! Logs go to stderr so that stdout carries only the campaign report. The
//! configured level applies to faultline's own crates; everything else the
//! harness links in stays at `warn`.

use std::io::IsTerminal;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use faultline_core::config::GeneralConfig;

/// Tracing targets whose level follows `general.log_level`.
const FAULTLINE_TARGETS: [&str; 5] = [
    "faultline",
    "faultline_core",
    "faultline_engine",
    "faultline_injector",
    "faultline_invariant",
];

/// Log line layout selected by `general.log_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for collecting trial logs.
    Json,
    /// Multi-line human-readable events.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => anyhow::bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
        }
    }
}

/// Filter directives for `level`: faultline crates at `level`, the rest at `warn`.
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_owned()];
    directives.extend(FAULTLINE_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level` when set. Colour codes are only
/// emitted when stderr is a terminal.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let format: LogFormat = config.log_format.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directives(&config.log_level)))
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    }
    .context("failed to initialize tracing subscriber")
}
