//! `faultline config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use faultline_core::config::FaultlineConfig;
use faultline_engine::EngineConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &str = "general, channel, trial, injector, invariant, campaign";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// Loads the file and also builds the engine and checker settings, so that
/// values only those layers check (durations, strategy names) are covered.
///
/// # Errors
///
/// Returns `CliError::Config` if validation fails.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match FaultlineConfig::load(config_path).await {
        Ok(config) => validate_layers(&config),
        Err(e) => vec![e.to_string()],
    };
    let report = ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

fn validate_layers(config: &FaultlineConfig) -> Vec<String> {
    match EngineConfig::from_core(config) {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    }
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
/// A missing file shows the defaults.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = FaultlineConfig::load_or_default(config_path).await?;

    let config_toml = match section.as_deref() {
        None => to_toml(&config),
        Some("general") => to_toml(&config.general),
        Some("channel") => to_toml(&config.channel),
        Some("trial") => to_toml(&config.trial),
        Some("injector") => to_toml(&config.injector),
        Some("invariant") => to_toml(&config.invariant),
        Some("campaign") => to_toml(&config.campaign),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {SECTIONS})"
            )));
        }
    };

    writer.render(&ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml,
    })
}

fn to_toml<T: Serialize>(value: &T) -> String {
    toml::to_string_pretty(value).unwrap_or_else(|e| format!("(serialization error: {e})"))
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(w, "# {} [{}]", self.source.dimmed(), section)?,
            None => writeln!(w, "# {}", self.source.dimmed())?,
        }
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.valid {
            writeln!(w, "{} {}", "valid".green().bold(), self.source)?;
        } else {
            writeln!(w, "{} {}", "invalid".red().bold(), self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_layers_accepts_defaults() {
        assert!(validate_layers(&FaultlineConfig::default()).is_empty());
    }

    #[test]
    fn test_validate_layers_reports_bad_default_strategy() {
        let mut config = FaultlineConfig::default();
        config.invariant.default_strategy = "ordered".to_owned();
        let errors = validate_layers(&config);
        assert!(!errors.is_empty());
        assert!(errors.iter().any(|e| e.contains("default_strategy")), "{errors:?}");
    }

    #[test]
    fn test_config_validation_report_lists_errors() {
        colored::control::set_override(false);
        let report = ConfigValidationReport {
            source: "faultline.toml".to_owned(),
            valid: false,
            errors: vec!["channel.max_connections must be greater than 0".to_owned()],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.starts_with("invalid faultline.toml"));
        assert!(text.contains("  - channel.max_connections"));
    }

    #[test]
    fn test_config_report_json_omits_toml_body() {
        let report = ConfigReport {
            source: "faultline.toml".to_owned(),
            section: Some("trial".to_owned()),
            config_toml: "trial_timeout_secs = 60\n".to_owned(),
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["section"], "trial");
        assert!(json.get("config_toml").is_none());
    }
}
