//! Rendering of command results to stdout, as text or JSON
//!
//! Campaign reports can be long and are often piped (`| less`, `| head`,
//! `> report.txt`), so the writer drops colour codes when stdout is not a
//! terminal and treats a closed pipe as a normal end of output.

use std::io::{IsTerminal, Write};

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes CLI output in the selected format.
///
/// Subcommand handlers call `writer.render(&payload)` where `payload`
/// implements both `Serialize` (for JSON) and `Render` (for text).
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        if !colour_enabled(format, std::io::stdout().is_terminal()) {
            colored::control::set_override(false);
        }
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = std::io::BufWriter::new(stdout.lock());
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// A reader that goes away early (`faultline campaign ... | head`) is not
    /// an error: the campaign already ran and its result log is on disk.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        let written = match self.format {
            OutputFormat::Text => payload.render_text(w).and_then(|()| w.flush()),
            OutputFormat::Json => match serde_json::to_writer_pretty(&mut *w, payload) {
                Err(e) if !e.is_io() => return Err(CliError::JsonSerialize(e)),
                serialized => serialized
                    .map_err(std::io::Error::from)
                    .and_then(|()| writeln!(w))
                    .and_then(|()| w.flush()),
            },
        };
        match written {
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            other => other.map_err(CliError::from),
        }
    }
}

/// Colour is only worth emitting for text output on a terminal.
fn colour_enabled(format: OutputFormat, stdout_is_terminal: bool) -> bool {
    matches!(format, OutputFormat::Text) && stdout_is_terminal
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI output payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}
