//! `faultline select` command handler

use tokio_util::sync::CancellationToken;
use tracing::info;

use faultline_core::config::FaultlineConfig;
use faultline_core::error::FaultlineError;
use faultline_core::invariant::InvariantReference;
use faultline_core::plan::load_invariant_list;

use crate::cli::SelectArgs;
use crate::commands::trials::{CampaignOutput, build_campaign, conclude};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `select` command.
///
/// Runs the driver once per invariant without injecting anything and
/// lists the checkpoints each run reached.
pub async fn execute(
    args: SelectArgs,
    config: &FaultlineConfig,
    writer: &OutputWriter,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    let invariants = if args.invariant.is_empty() {
        load_invariant_list(&args.invariants)
            .await
            .map_err(FaultlineError::from)?
    } else {
        args.invariant
            .iter()
            .map(|text| InvariantReference::parse(text))
            .collect::<Result<Vec<_>, _>>()
            .map_err(FaultlineError::from)?
    };
    info!(invariants = invariants.len(), "starting selection stage");

    let mut campaign = build_campaign(config, &args.scripts, cancel)?;
    let report = campaign.select(&invariants).await;

    let output = CampaignOutput::selection(report);
    writer.render(&output)?;
    conclude(&output.report)
}
