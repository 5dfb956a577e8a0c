//! `faultline campaign` command handler

use tokio_util::sync::CancellationToken;
use tracing::info;

use faultline_core::config::FaultlineConfig;
use faultline_core::plan::load_invariant_list;

use crate::cli::CampaignArgs;
use crate::commands::trials::{CampaignOutput, build_campaign, conclude};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `campaign` command.
///
/// The invariant list is read before any trial starts; a malformed list
/// aborts the command without running the driver.
pub async fn execute(
    args: CampaignArgs,
    config: &FaultlineConfig,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let mut config = config.clone();
    if let Some(trials) = args.trials {
        config.trial.trials_per_invariant = trials;
    }

    let invariants = load_invariant_list(&args.invariants)
        .await
        .map_err(faultline_core::error::FaultlineError::from)?;
    info!(
        plan = %args.plan.display(),
        invariants = invariants.len(),
        trials_per_invariant = config.trial.trials_per_invariant,
        "starting campaign"
    );

    let mut campaign = build_campaign(&config, &args.scripts, cancel)?;
    let report = campaign.run_invariants(&args.plan, &invariants).await;

    let output = CampaignOutput::injection(report);
    writer.render(&output)?;
    conclude(&output.report)
}
