//! `faultline replay` command handler

use tokio_util::sync::CancellationToken;
use tracing::info;

use faultline_core::config::FaultlineConfig;

use crate::cli::ReplayArgs;
use crate::commands::trials::{CampaignOutput, build_campaign, conclude};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `replay` command.
///
/// Runs one trial of the plan against the invariant written in the plan itself.
/// A recorded violation file can be passed back here unchanged.
///
/// # Errors
///
/// A violation is a finding and still succeeds. Returns
/// `CliError::EngineFailed` when the trial failed inside the harness and
/// `CliError::Interrupted` when a shutdown signal stopped it.
pub async fn execute(
    args: ReplayArgs,
    config: &FaultlineConfig,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    info!(plan = %args.plan.display(), driver = %args.scripts.driver.display(), "replaying failure plan");

    let mut campaign = build_campaign(config, &args.scripts, cancel)?;
    let report = campaign.replay(&args.plan).await;

    let output = CampaignOutput::injection(report);
    writer.render(&output)?;
    conclude(&output.report)
}
