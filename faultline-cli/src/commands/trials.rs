//! Shared pieces of the trial-running commands (`replay`, `campaign`, `select`)

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use faultline_core::config::FaultlineConfig;
use faultline_core::types::CheckpointId;
use faultline_engine::{Campaign, CampaignReport, ScriptCommand};
use faultline_injector::ProcessController;

use crate::cli::ScriptArgs;
use crate::error::CliError;
use crate::output::Render;

/// Build the driver and cleanup commands from CLI arguments.
pub fn script_commands(args: &ScriptArgs) -> (ScriptCommand, Option<ScriptCommand>) {
    let driver = ScriptCommand::new(&args.driver).with_args(args.driver_args.iter().cloned());
    let cleanup = args.cleanup.as_ref().map(ScriptCommand::new);
    (driver, cleanup)
}

/// Build a campaign that controls real processes and stops when `cancel` fires.
pub fn build_campaign(
    config: &FaultlineConfig,
    args: &ScriptArgs,
    cancel: CancellationToken,
) -> Result<Campaign<ProcessController>, CliError> {
    let (driver, cleanup) = script_commands(args);
    Ok(Campaign::from_config(config, driver, cleanup)?.with_cancellation(cancel))
}

/// Map a finished campaign to the process result.
///
/// Violations and inconclusive trials are findings, not failures: the command
/// succeeds as long as at least one trial completed. An interrupted campaign
/// fails regardless of what the trials that did run found.
pub fn conclude(report: &CampaignReport) -> Result<(), CliError> {
    if report.interrupted {
        return Err(CliError::Interrupted(report.summary.total()));
    }
    if report.engine_failed() {
        return Err(CliError::EngineFailed(report.summary.engine_error));
    }
    Ok(())
}

/// Campaign report as rendered by the CLI.
#[derive(Serialize)]
pub struct CampaignOutput {
    #[serde(flatten)]
    pub report: CampaignReport,
    /// Checkpoints reached per invariant (selection stage only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<BTreeMap<String, Vec<CheckpointId>>>,
}

impl CampaignOutput {
    pub fn injection(report: CampaignReport) -> Self {
        Self {
            report,
            reachable: None,
        }
    }

    pub fn selection(report: CampaignReport) -> Self {
        let reachable = Some(report.reachable_checkpoints());
        Self { report, reachable }
    }
}

impl Render for CampaignOutput {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let report = &self.report;
        writeln!(
            w,
            "Stage: {}  Trials: {}  ({} ms)",
            report.stage.to_string().bold(),
            report.summary.total(),
            report.duration_ms
        )?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<24} {:<20} {:<14} {:<12} Detail",
            "Invariant", "Plan", "Outcome", "Checkpoints"
        )?;
        writeln!(w, "{}", "-".repeat(90))?;

        for result in &report.results {
            let kind = result.outcome.kind();
            let kind_colored = match kind {
                "pass" => kind.green(),
                "violation" => kind.red().bold(),
                "inconclusive" => kind.yellow(),
                _ => kind.magenta(),
            };
            let detail = match result.outcome.to_string().split_once(": ") {
                Some((_, detail)) => detail.to_owned(),
                None => String::new(),
            };
            writeln!(
                w,
                "{:<24} {:<20} {:<14} {:<12} {}",
                truncate(&result.invariant, 24),
                truncate(&result.plan_id, 20),
                kind_colored,
                result.diagnostics.checkpoints_seen.len(),
                detail
            )?;
            if let Some(warning) = &result.cleanup_warning {
                writeln!(w, "  {}", format!("cleanup: {warning}").dimmed())?;
            }
            if !result.diagnostics.lingering_faults.is_empty() {
                writeln!(
                    w,
                    "  {}",
                    format!(
                        "lingering faults: {}",
                        result.diagnostics.lingering_faults.join(", ")
                    )
                    .dimmed()
                )?;
            }
        }

        writeln!(w)?;
        let summary = &report.summary;
        writeln!(
            w,
            "Summary: {} pass, {} violation, {} inconclusive, {} engine error",
            summary.pass.to_string().green(),
            summary.violation.to_string().red(),
            summary.inconclusive.to_string().yellow(),
            summary.engine_error.to_string().magenta()
        )?;

        if !report.violation_records.is_empty() {
            writeln!(w)?;
            writeln!(w, "Violation records (replay with `faultline replay <file>`):")?;
            for path in &report.violation_records {
                writeln!(w, "  {path}")?;
            }
        }

        if let Some(reachable) = &self.reachable {
            writeln!(w)?;
            writeln!(w, "Reachable checkpoints:")?;
            for (invariant, checkpoints) in reachable {
                let ids: Vec<&str> = checkpoints.iter().map(CheckpointId::as_str).collect();
                writeln!(w, "  {:<24} {}", invariant, ids.join(" "))?;
            }
        }

        Ok(())
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::result::{Diagnostics, TrialOutcome, TrialResult};
    use faultline_core::types::Stage;
    use faultline_engine::CampaignSummary;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn result(invariant: &str, outcome: TrialOutcome, checkpoints: &[&str]) -> TrialResult {
        TrialResult {
            trial_id: Uuid::new_v4(),
            invariant: invariant.to_owned(),
            plan_id: "leader-crash".to_owned(),
            outcome,
            diagnostics: Diagnostics {
                checkpoints_seen: checkpoints.iter().map(|c| CheckpointId::from(*c)).collect(),
                ..Diagnostics::default()
            },
            cleanup_warning: None,
            started_at_ms: 0,
            duration_ms: 10,
        }
    }

    fn report(results: Vec<TrialResult>, summary: CampaignSummary) -> CampaignReport {
        CampaignReport {
            stage: Stage::Injection,
            results,
            summary,
            violation_records: Vec::new(),
            started_at_ms: 0,
            duration_ms: 20,
            interrupted: false,
        }
    }

    #[test]
    fn test_script_commands_carry_driver_args() {
        let args = ScriptArgs {
            driver: PathBuf::from("./driver.sh"),
            driver_args: vec!["--nodes".to_owned(), "3".to_owned()],
            cleanup: Some(PathBuf::from("./cleanup.sh")),
        };
        let (driver, cleanup) = script_commands(&args);
        assert_eq!(driver.to_string(), "./driver.sh --nodes 3");
        assert_eq!(cleanup.map(|c| c.to_string()), Some("./cleanup.sh".to_owned()));
    }

    fn engine_error(invariant: &str) -> TrialResult {
        result(
            invariant,
            TrialOutcome::EngineError {
                reason: "channel timeout".to_owned(),
            },
            &[],
        )
    }

    #[test]
    fn test_conclude_all_engine_errors_fails() {
        let summary = CampaignSummary {
            engine_error: 2,
            ..CampaignSummary::default()
        };
        let results = vec![engine_error("a"), engine_error("b")];
        let err = conclude(&report(results, summary)).expect_err("should fail");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_conclude_interrupted_campaign_fails_with_130() {
        let mut interrupted = report(
            vec![result("rows", TrialOutcome::Pass, &["1"])],
            CampaignSummary {
                pass: 1,
                ..CampaignSummary::default()
            },
        );
        interrupted.interrupted = true;
        let err = conclude(&interrupted).expect_err("should fail");
        assert_eq!(err.exit_code(), 130);
        assert!(err.to_string().contains("1 trial(s)"));
    }

    #[test]
    fn test_conclude_interrupted_before_any_trial_is_not_engine_failure() {
        let mut interrupted = report(Vec::new(), CampaignSummary::default());
        interrupted.interrupted = true;
        let err = conclude(&interrupted).expect_err("should fail");
        assert!(matches!(err, CliError::Interrupted(0)));
    }

    #[test]
    fn test_conclude_violations_are_success() {
        let summary = CampaignSummary {
            violation: 2,
            engine_error: 1,
            ..CampaignSummary::default()
        };
        assert!(conclude(&report(Vec::new(), summary)).is_ok());
    }

    #[test]
    fn test_render_text_lists_results_and_summary() {
        colored::control::set_override(false);
        let output = CampaignOutput::injection(report(
            vec![
                result("rows", TrialOutcome::Pass, &["1", "2"]),
                result(
                    "rows-high",
                    TrialOutcome::Violation {
                        evidence: "rows=100, expected 200".to_owned(),
                    },
                    &["1"],
                ),
            ],
            CampaignSummary {
                pass: 1,
                violation: 1,
                ..CampaignSummary::default()
            },
        ));

        let mut buffer = Vec::new();
        output.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("Stage: INJECTION"));
        assert!(text.contains("rows-high"));
        assert!(text.contains("rows=100, expected 200"));
        assert!(text.contains("Summary: 1 pass, 1 violation, 0 inconclusive, 0 engine error"));
        assert!(!text.contains("Reachable checkpoints"));
    }

    #[test]
    fn test_selection_output_includes_reachable_checkpoints() {
        colored::control::set_override(false);
        let output = CampaignOutput::selection(report(
            vec![result("done", TrialOutcome::Pass, &["3", "1", "3"])],
            CampaignSummary {
                pass: 1,
                ..CampaignSummary::default()
            },
        ));

        let json = serde_json::to_value(&output).expect("serialize");
        assert_eq!(json["summary"]["pass"], 1);
        assert_eq!(json["reachable"]["done"], serde_json::json!(["3", "1"]));

        let mut buffer = Vec::new();
        output.render_text(&mut buffer).expect("render");
        let text = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(text.contains("Reachable checkpoints:"));
        assert!(text.contains("3 1"));
    }

    #[test]
    fn test_truncate_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
