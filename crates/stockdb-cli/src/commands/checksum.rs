use stockdb_core::{ChecksumOptions, SyncEngine};

use crate::cli::ChecksumArgs;
use crate::commands::{parse_date, CommandOutcome};
use crate::error::CliError;

pub async fn run(
    args: &ChecksumArgs,
    engine: &mut SyncEngine,
) -> Result<CommandOutcome, CliError> {
    let options = ChecksumOptions {
        market: args.market.clone(),
        start: parse_date(args.start.as_deref())?,
        end: parse_date(args.end.as_deref())?,
        sync: args.sync,
        remove: args.remove,
    };

    let report = engine.checksum(&options).await?;
    let failures = report.repair_failures.len();
    Ok(CommandOutcome::ok(serde_json::to_value(&report)?).with_failures(failures))
}
