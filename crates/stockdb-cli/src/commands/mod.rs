mod checksum;
mod config;
mod coverage;
mod reference;
mod sync;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use stockdb_core::{
    CancelFlag, ProviderPolicy, RemoteClient, SyncEngine, TradeDate, TushareTransport, Warehouse,
    WarehouseConfig,
};
use tracing::debug;

use crate::cli::{Cli, Command, ConfigCommand, ReferenceCommand, SyncCommand};
use crate::error::CliError;

/// Config row holding the provider token.
pub const TOKEN_CONFIG_CODE: &str = "tushare_token";
pub const TOKEN_ENV: &str = "STOCKDB_TOKEN";

/// A command's JSON report and the number of failures it recorded.
pub struct CommandOutcome {
    pub data: Value,
    pub failures: usize,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self { data, failures: 0 }
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }
}

pub async fn run(cli: &Cli, cancel: CancelFlag) -> Result<CommandOutcome, CliError> {
    let warehouse = open_warehouse(cli)?;

    match &cli.command {
        Command::Sync(SyncCommand::Stocks(args)) => {
            let mut engine = engine(cli, warehouse, cancel)?;
            sync::stocks(args, &mut engine).await
        }
        Command::Sync(SyncCommand::Indexes(args)) => {
            let mut engine = engine(cli, warehouse, cancel)?;
            sync::indexes(args, &mut engine).await
        }
        Command::Sync(SyncCommand::Daily(args)) => {
            let mut engine = engine(cli, warehouse, cancel)?;
            sync::daily(args, &mut engine).await
        }
        Command::Checksum(args) => {
            let mut engine = engine(cli, warehouse, cancel)?;
            checksum::run(args, &mut engine).await
        }
        Command::Reference(ReferenceCommand::Load(args)) => reference::load(args, &warehouse),
        Command::Config(ConfigCommand::Set(args)) => config::set(args, &warehouse),
        Command::Config(ConfigCommand::Get(args)) => config::get(args, &warehouse),
        Command::Coverage(args) => coverage::run(args, &warehouse),
    }
}

fn open_warehouse(cli: &Cli) -> Result<Warehouse, CliError> {
    let config = match &cli.home {
        Some(home) => WarehouseConfig::at(home),
        None => WarehouseConfig::default(),
    };
    debug!(db_path = %config.db_path.display(), "opening warehouse");
    Ok(Warehouse::open(config)?)
}

/// Provider policy from the environment with CLI overrides applied.
pub fn provider_policy(cli: &Cli) -> ProviderPolicy {
    let mut policy = ProviderPolicy::from_env();
    if cli.rate_limit.is_some() || cli.rate_window_secs.is_some() {
        let limit = cli.rate_limit.unwrap_or(policy.quota_limit);
        let window = cli
            .rate_window_secs
            .map_or(policy.quota_window, Duration::from_secs);
        policy = policy.with_quota(limit, window);
    }
    if let Some(retries) = cli.max_retries {
        policy.retry.max_attempts = Some(retries.saturating_add(1));
    }
    policy
}

/// The provider token: flag first, then environment, then the configs table.
pub fn resolve_token(
    flag: Option<&str>,
    from_env: Option<String>,
    warehouse: &Warehouse,
) -> Result<Option<String>, CliError> {
    let explicit = flag
        .map(str::to_string)
        .or(from_env)
        .filter(|token| !token.trim().is_empty());
    if explicit.is_some() {
        return Ok(explicit);
    }

    Ok(warehouse
        .config_value(TOKEN_CONFIG_CODE)?
        .map(|record| record.value)
        .filter(|token| !token.trim().is_empty()))
}

fn engine(cli: &Cli, warehouse: Warehouse, cancel: CancelFlag) -> Result<SyncEngine, CliError> {
    let policy = provider_policy(cli);
    let token = resolve_token(cli.token.as_deref(), env::var(TOKEN_ENV).ok(), &warehouse)?;

    let transport = Arc::new(TushareTransport::from_policy(&policy));
    let mut client = RemoteClient::new(transport, &policy);
    if let Some(token) = token {
        client.set_token(token);
    }

    Ok(SyncEngine::new(warehouse, client).with_cancel_flag(cancel))
}

pub(crate) fn parse_date(value: Option<&str>) -> Result<Option<TradeDate>, CliError> {
    value
        .map(TradeDate::parse)
        .transpose()
        .map_err(CliError::from)
}
