//! CLI argument definitions for stockdb.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sync stocks` | Sync the instrument master list |
//! | `sync indexes` | Sync the index master list |
//! | `sync daily` | Sync daily bars |
//! | `checksum` | Compare provider and local bar coverage |
//! | `reference load` | Load reference data from JSON |
//! | `config set/get` | Manage key/value settings |
//! | `coverage` | Show stored bar coverage and recent runs |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--home` | `$STOCKDB_HOME` or `~/.stockdb` | Data directory |
//! | `--token` | `$STOCKDB_TOKEN` or configs `tushare_token` | Provider token |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--rate-limit` | `200` | Calls per operation per window |
//! | `--rate-window-secs` | `60` | Call window length |
//! | `--max-retries` | unbounded | Retries per call before giving up |
//!
//! # Examples
//!
//! ```bash
//! stockdb reference load reference.json
//! stockdb config set tushare_token <token> --name "provider token"
//! stockdb sync stocks
//! stockdb sync daily --market XSHG --start 20230101 --end 20230131
//! stockdb checksum --market XSHG --start 20230101 --sync --remove --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Sync and reconcile market reference data from the provider into DuckDB.
#[derive(Debug, Parser)]
#[command(name = "stockdb", author, version, about = "Market reference data sync")]
pub struct Cli {
    /// Data directory holding `warehouse.duckdb`.
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Provider access token.
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Provider calls allowed per operation per window.
    #[arg(long, global = true)]
    pub rate_limit: Option<u32>,

    /// Length of the rolling call window in seconds.
    #[arg(long, global = true)]
    pub rate_window_secs: Option<u64>,

    /// Give up on a call after this many retries. Unbounded when absent.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull data from the provider into the warehouse.
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Compare provider and local bar coverage, optionally repairing it.
    ///
    /// # Examples
    ///
    ///   stockdb checksum --market XSHG --start 20230101
    ///   stockdb checksum --sync --remove
    Checksum(ChecksumArgs),

    /// Manage reference tables (markets, subjects, periods, ...).
    #[command(subcommand)]
    Reference(ReferenceCommand),

    /// Read and write key/value settings.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show stored bar coverage, listing summary and recent sync runs.
    Coverage(CoverageArgs),
}

#[derive(Debug, Subcommand)]
pub enum SyncCommand {
    /// Sync the instrument master list.
    Stocks(StocksArgs),
    /// Sync the index master list.
    Indexes(IndexesArgs),
    /// Sync daily bars.
    ///
    /// Without dates the run resumes from the day after the latest stored bar.
    Daily(DailyArgs),
}

#[derive(Debug, Args)]
pub struct StocksArgs {
    /// Local market code (e.g. XSHG).
    #[arg(long)]
    pub market: Option<String>,

    /// Reuse lookups instead of rebuilding them first.
    #[arg(long, default_value_t = false)]
    pub keep_lookups: bool,
}

#[derive(Debug, Args)]
pub struct IndexesArgs {
    /// Provider index market (e.g. SSE, CSI).
    #[arg(long)]
    pub market: Option<String>,
}

#[derive(Debug, Args)]
pub struct DailyArgs {
    /// Local market code (e.g. XSHG).
    #[arg(long)]
    pub market: Option<String>,

    /// First date, YYYYMMDD or YYYY-MM-DD.
    #[arg(long)]
    pub start: Option<String>,

    /// Last date, YYYYMMDD or YYYY-MM-DD.
    #[arg(long)]
    pub end: Option<String>,

    /// Explicit trading date; repeatable. Overrides --start/--end.
    #[arg(long = "date")]
    pub dates: Vec<String>,

    /// Local stock code to limit the run to; repeatable.
    #[arg(long = "stock")]
    pub stocks: Vec<String>,

    /// Rewrite bars on dates that already have data.
    #[arg(long, default_value_t = false)]
    pub update: bool,

    /// Reuse lookups instead of rebuilding them first.
    #[arg(long, default_value_t = false)]
    pub keep_lookups: bool,
}

#[derive(Debug, Args)]
pub struct ChecksumArgs {
    /// Local market code (e.g. XSHG).
    #[arg(long)]
    pub market: Option<String>,

    /// First audited date.
    #[arg(long)]
    pub start: Option<String>,

    /// Last audited date.
    #[arg(long)]
    pub end: Option<String>,

    /// Fetch and write missing bars.
    #[arg(long, default_value_t = false)]
    pub sync: bool,

    /// Delete bars the provider no longer reports.
    #[arg(long, default_value_t = false)]
    pub remove: bool,
}

#[derive(Debug, Subcommand)]
pub enum ReferenceCommand {
    /// Upsert reference tables from a JSON document.
    Load(ReferenceLoadArgs),
}

#[derive(Debug, Args)]
pub struct ReferenceLoadArgs {
    /// JSON file with `currencies`, `regions`, `firms`, `markets`, `subjects`
    /// and `periods` arrays. Loads the built-in mainland set when omitted.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Store a setting.
    Set(ConfigSetArgs),
    /// Print a setting.
    Get(ConfigGetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    pub code: String,
    pub value: String,

    /// Human-readable label.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigGetArgs {
    pub code: String,
}

#[derive(Debug, Args)]
pub struct CoverageArgs {
    /// Local market code (e.g. XSHG).
    #[arg(long)]
    pub market: Option<String>,

    /// Number of recent sync runs to list.
    #[arg(long, default_value_t = 10)]
    pub history: usize,
}
