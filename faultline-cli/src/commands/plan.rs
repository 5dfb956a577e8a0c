//! `faultline plan` command handler

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use faultline_core::config::FaultlineConfig;
use faultline_core::error::FaultlineError;
use faultline_core::plan::FailurePlan;
use faultline_invariant::{CheckerConfig, InvariantChecker};

use crate::cli::{PlanAction, PlanArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `plan` command.
pub async fn execute(
    args: PlanArgs,
    config: &FaultlineConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        PlanAction::Validate { paths } => execute_validate(&paths, config, writer).await,
        PlanAction::Show { path } => execute_show(&path, writer).await,
    }
}

/// Parse each plan and resolve its invariant without running anything.
///
/// # Errors
///
/// Returns `CliError::InvalidPlans` if any file fails, after reporting all of them.
async fn execute_validate(
    paths: &[PathBuf],
    config: &FaultlineConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let checker = InvariantChecker::new(CheckerConfig::from_core(&config.invariant)?);

    let mut plans = Vec::with_capacity(paths.len());
    for path in paths {
        info!(path = %path.display(), "validating failure plan");
        plans.push(validate_one(path, &checker).await);
    }

    let invalid = plans.iter().filter(|p| !p.valid).count();
    writer.render(&PlanValidationReport { plans })?;

    if invalid > 0 {
        return Err(CliError::InvalidPlans(invalid));
    }
    Ok(())
}

async fn validate_one(path: &Path, checker: &InvariantChecker) -> PlanValidation {
    let source = path.display().to_string();
    let plan = match FailurePlan::load(path).await {
        Ok(plan) => plan,
        Err(e) => {
            return PlanValidation {
                source,
                valid: false,
                plan_id: None,
                events: 0,
                strategy: None,
                error: Some(e.to_string()),
            };
        }
    };

    let (strategy, error) = match checker.resolve(&plan.invariant) {
        Ok(resolved) => (Some(resolved.label().to_owned()), None),
        Err(e) => (None, Some(e.to_string())),
    };
    PlanValidation {
        source,
        valid: error.is_none(),
        plan_id: Some(plan.id.clone()),
        events: plan.events.len(),
        strategy,
        error,
    }
}

/// Show a parsed plan in canonical form.
async fn execute_show(path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let plan = FailurePlan::load(path)
        .await
        .map_err(FaultlineError::from)?;
    writer.render(&PlanReport {
        source: path.display().to_string(),
        plan_text: plan.to_plan_text(),
        plan,
    })
}

/// Validation result for a single plan file.
#[derive(Serialize)]
pub struct PlanValidation {
    pub source: String,
    pub valid: bool,
    pub plan_id: Option<String>,
    pub events: usize,
    pub strategy: Option<String>,
    pub error: Option<String>,
}

/// Validation results for all plan files.
#[derive(Serialize)]
pub struct PlanValidationReport {
    pub plans: Vec<PlanValidation>,
}

impl Render for PlanValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for plan in &self.plans {
            if plan.valid {
                writeln!(
                    w,
                    "{} {} ({}, {} events, strategy {})",
                    "valid".green().bold(),
                    plan.source,
                    plan.plan_id.as_deref().unwrap_or("-"),
                    plan.events,
                    plan.strategy.as_deref().unwrap_or("-")
                )?;
            } else {
                writeln!(w, "{} {}", "invalid".red().bold(), plan.source)?;
                if let Some(error) = &plan.error {
                    writeln!(w, "  {}", error.dimmed())?;
                }
            }
        }
        Ok(())
    }
}

/// Parsed plan with its canonical text.
#[derive(Serialize)]
pub struct PlanReport {
    pub source: String,
    pub plan: FailurePlan,
    #[serde(skip)]
    pub plan_text: String,
}

impl Render for PlanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "# {}", self.source.dimmed())?;
        write!(w, "{}", self.plan_text)?;
        Ok(())
    }
}
