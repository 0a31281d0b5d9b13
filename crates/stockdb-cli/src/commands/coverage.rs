use serde_json::json;
use stockdb_core::{Warehouse, DAILY_PERIOD};

use crate::cli::CoverageArgs;
use crate::commands::CommandOutcome;
use crate::error::CliError;

pub fn run(args: &CoverageArgs, warehouse: &Warehouse) -> Result<CommandOutcome, CliError> {
    let coverage = warehouse.period_coverage(DAILY_PERIOD, args.market.as_deref())?;
    let listings = warehouse.listing_summary()?;
    let history = warehouse.sync_history(args.history)?;

    Ok(CommandOutcome::ok(json!({
        "coverage": coverage,
        "listings": listings,
        "history": history,
    })))
}
