use std::fs;

use stockdb_core::{ReferenceData, Warehouse};
use tracing::info;

use crate::cli::ReferenceLoadArgs;
use crate::commands::CommandOutcome;
use crate::error::CliError;

pub fn load(args: &ReferenceLoadArgs, warehouse: &Warehouse) -> Result<CommandOutcome, CliError> {
    let data = match &args.file {
        Some(path) => {
            info!(path = %path.display(), "loading reference data");
            ReferenceData::from_json(&fs::read_to_string(path)?)?
        }
        None => ReferenceData::china_a_shares(),
    };

    let report = data.load_into(warehouse)?;
    Ok(CommandOutcome::ok(serde_json::to_value(&report)?))
}
