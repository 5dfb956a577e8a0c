//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Faultline -- replay failure plans against a system under test and check invariants.
///
/// Use `faultline <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "faultline", version, about, long_about = None)]
pub struct Cli {
    /// Path to the faultline.toml configuration file (defaults apply when missing).
    #[arg(short, long, default_value = "faultline.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay one failure plan with the invariant it declares.
    Replay(ReplayArgs),

    /// Replay one failure plan once per invariant in a list.
    Campaign(CampaignArgs),

    /// Run the driver without faults and list the checkpoints it reaches.
    Select(SelectArgs),

    /// Inspect failure plan files.
    Plan(PlanArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scripts shared by trial commands ----

/// Driver and cleanup scripts for a trial.
#[derive(Args, Debug, Clone)]
pub struct ScriptArgs {
    /// Driver script that runs the system under test and reports checkpoints.
    #[arg(long)]
    pub driver: PathBuf,

    /// Extra argument passed to the driver (repeatable).
    #[arg(long = "driver-arg", allow_hyphen_values = true)]
    pub driver_args: Vec<String>,

    /// Cleanup script run exactly once after every trial.
    #[arg(long)]
    pub cleanup: Option<PathBuf>,
}

// ---- replay ----

/// Replay a single failure plan.
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Failure plan file.
    pub plan: PathBuf,

    #[command(flatten)]
    pub scripts: ScriptArgs,
}

// ---- campaign ----

/// Check a list of invariants against one failure plan.
#[derive(Args, Debug)]
pub struct CampaignArgs {
    /// Failure plan file whose fault events are reused for every invariant.
    pub plan: PathBuf,

    /// Invariant list file (one reference per line).
    #[arg(long, default_value = "selected-invariants.txt")]
    pub invariants: PathBuf,

    /// Override `trial.trials_per_invariant`.
    #[arg(long)]
    pub trials: Option<u32>,

    #[command(flatten)]
    pub scripts: ScriptArgs,
}

// ---- select ----

/// Selection-stage dry run.
#[derive(Args, Debug)]
pub struct SelectArgs {
    /// Invariant list file, used when no `--invariant` is given.
    #[arg(long, default_value = "selected-invariants.txt")]
    pub invariants: PathBuf,

    /// Invariant reference to run (repeatable, overrides the list file).
    #[arg(long = "invariant")]
    pub invariant: Vec<String>,

    #[command(flatten)]
    pub scripts: ScriptArgs,
}

// ---- plan ----

/// Inspect failure plans without running them.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub action: PlanAction,
}

#[derive(Subcommand, Debug)]
pub enum PlanAction {
    /// Parse plan files and report errors.
    Validate {
        /// Plan files to validate.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the parsed plan in canonical form.
    Show {
        /// Plan file.
        path: PathBuf,
    },
}

// ---- config ----

/// Manage faultline configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, channel, trial, injector, invariant, campaign).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_replay() {
        let cli = Cli::try_parse_from([
            "faultline",
            "replay",
            "plans/leader-crash.plan",
            "--driver",
            "./driver.sh",
            "--cleanup",
            "./cleanup.sh",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.plan, PathBuf::from("plans/leader-crash.plan"));
                assert_eq!(args.scripts.driver, PathBuf::from("./driver.sh"));
                assert_eq!(args.scripts.cleanup, Some(PathBuf::from("./cleanup.sh")));
                assert!(args.scripts.driver_args.is_empty());
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn test_cli_replay_requires_driver() {
        let result = Cli::try_parse_from(["faultline", "replay", "p.plan"]);
        assert!(result.is_err(), "--driver is required");
    }

    #[test]
    fn test_cli_parse_campaign_defaults() {
        let cli = Cli::try_parse_from(["faultline", "campaign", "p.plan", "--driver", "d.sh"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Campaign(args) => {
                assert_eq!(args.invariants, PathBuf::from("selected-invariants.txt"));
                assert!(args.trials.is_none());
                assert!(args.scripts.cleanup.is_none());
            }
            _ => panic!("expected Campaign command"),
        }
    }

    #[test]
    fn test_cli_parse_driver_args_with_hyphens() {
        let cli = Cli::try_parse_from([
            "faultline",
            "replay",
            "p.plan",
            "--driver",
            "d.sh",
            "--driver-arg",
            "--nodes",
            "--driver-arg",
            "3",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.scripts.driver_args, vec!["--nodes", "3"]);
            }
            _ => panic!("expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_select_with_invariants() {
        let cli = Cli::try_parse_from([
            "faultline",
            "select",
            "--driver",
            "d.sh",
            "--invariant",
            "a",
            "--invariant",
            "b: reaches 3",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Select(args) => assert_eq!(args.invariant, vec!["a", "b: reaches 3"]),
            _ => panic!("expected Select command"),
        }
    }

    #[test]
    fn test_cli_parse_plan_validate_multiple() {
        let cli = Cli::try_parse_from(["faultline", "plan", "validate", "a.plan", "b.plan"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Plan(PlanArgs {
                action: PlanAction::Validate { paths },
            }) => assert_eq!(paths.len(), 2),
            _ => panic!("expected Plan Validate command"),
        }
    }

    #[test]
    fn test_cli_global_output_json() {
        let cli = Cli::try_parse_from(["faultline", "config", "validate", "--output", "json"])
            .expect("parse succeeded");
        assert!(matches!(cli.output, OutputFormat::Json));
        assert_eq!(cli.config, PathBuf::from("faultline.toml"));
    }
}
