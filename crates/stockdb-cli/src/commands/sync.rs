use stockdb_core::{DailySyncOptions, IndexSyncOptions, StockSyncOptions, SyncEngine, TradeDate};

use crate::cli::{DailyArgs, IndexesArgs, StocksArgs};
use crate::commands::{parse_date, CommandOutcome};
use crate::error::CliError;

pub async fn stocks(
    args: &StocksArgs,
    engine: &mut SyncEngine,
) -> Result<CommandOutcome, CliError> {
    let options = StockSyncOptions {
        market: args.market.clone(),
        clear_lookups: !args.keep_lookups,
    };
    let report = engine.sync_stocks(&options).await?;
    Ok(CommandOutcome::ok(serde_json::to_value(&report)?))
}

pub async fn indexes(
    args: &IndexesArgs,
    engine: &mut SyncEngine,
) -> Result<CommandOutcome, CliError> {
    let options = IndexSyncOptions {
        market: args.market.clone(),
        ..IndexSyncOptions::default()
    };
    let report = engine.sync_indexes(&options).await?;
    Ok(CommandOutcome::ok(serde_json::to_value(&report)?))
}

pub async fn daily(
    args: &DailyArgs,
    engine: &mut SyncEngine,
) -> Result<CommandOutcome, CliError> {
    let options = daily_options(args)?;
    let report = engine.sync_daily(&options).await?;
    let failures = report.failed.len();
    Ok(CommandOutcome::ok(serde_json::to_value(&report)?).with_failures(failures))
}

fn daily_options(args: &DailyArgs) -> Result<DailySyncOptions, CliError> {
    let dates = args
        .dates
        .iter()
        .map(|date| TradeDate::parse(date))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DailySyncOptions {
        market: args.market.clone(),
        start: parse_date(args.start.as_deref())?,
        end: parse_date(args.end.as_deref())?,
        dates,
        stocks: args.stocks.clone(),
        update: args.update,
        clear_lookups: !args.keep_lookups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command, SyncCommand};
    use clap::Parser;

    fn daily_args(argv: &[&str]) -> DailyArgs {
        let cli = Cli::parse_from(argv);
        match cli.command {
            Command::Sync(SyncCommand::Daily(args)) => args,
            other => panic!("expected sync daily, got {other:?}"),
        }
    }

    #[test]
    fn daily_flags_become_sync_options() {
        let args = daily_args(&[
            "stockdb",
            "sync",
            "daily",
            "--market",
            "XSHG",
            "--start",
            "2023-01-03",
            "--end",
            "20230131",
            "--keep-lookups",
        ]);

        let options = daily_options(&args).expect("options");
        assert_eq!(options.market.as_deref(), Some("XSHG"));
        assert_eq!(options.start.map(TradeDate::compact).as_deref(), Some("20230103"));
        assert_eq!(options.end.map(TradeDate::compact).as_deref(), Some("20230131"));
        assert!(!options.update);
        assert!(!options.clear_lookups);
    }

    #[test]
    fn malformed_dates_are_rejected() {
        let args = daily_args(&["stockdb", "sync", "daily", "--date", "2023-13-45"]);

        let error = daily_options(&args).expect_err("bad date");
        assert_eq!(error.exit_code(), 2);
    }
}
