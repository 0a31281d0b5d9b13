//! Synchronizers and the reconciliation engine.
//!
//! A [`SyncEngine`] bundles everything one sync job needs: the warehouse, a
//! rate-limited [`RemoteClient`], the job's [`LookupCache`] and a
//! [`CancelFlag`]. Jobs are single-writer; run one engine at a time against a
//! warehouse.
//!
//! | Operation | Module |
//! |-----------|--------|
//! | [`SyncEngine::sync_stocks`] | [`stocks`] |
//! | [`SyncEngine::sync_indexes`] | [`indexes`] |
//! | [`SyncEngine::sync_daily`] | [`daily`] |
//! | [`SyncEngine::checksum`] | [`checksum`] |
//! | [`SyncEngine::load_reference`] | [`reference`] |

pub mod checksum;
pub mod daily;
pub mod indexes;
pub mod reference;
pub mod stocks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stockdb_warehouse::{SyncLogRecord, Warehouse};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{TradeDate, DAILY_PERIOD};
use crate::error::ValidationError;
use crate::lookup::LookupCache;
use crate::remote::RemoteClient;

pub use checksum::{
    diff_by_date, ChecksumOptions, ChecksumReport, MarketDrift, RepairFailure, SymbolsByDate,
};
pub use daily::{DailySyncOptions, DailySyncReport, SkippedBar};
pub use indexes::{IndexSyncOptions, IndexSyncReport};
pub use reference::{ReferenceData, ReferenceLoadReport};
pub use stocks::{SkippedRow, StockSyncOptions, StockSyncReport};

/// Tunables shared by every synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Rows per bulk insert/update batch.
    pub batch_size: usize,
    /// Provider symbols per daily-bar call.
    pub symbols_per_call: usize,
    /// First date the provider has data for.
    pub earliest_date: TradeDate,
    /// Period code the time-series jobs write.
    pub period: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5_000,
            symbols_per_call: 100,
            earliest_date: TradeDate::from_date(time::macros::date!(1990 - 12 - 19)),
            period: DAILY_PERIOD.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::NotPositive {
                field: "batch_size",
            });
        }
        if self.symbols_per_call == 0 {
            return Err(ValidationError::NotPositive {
                field: "symbols_per_call",
            });
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between a running job and its owner.
///
/// Jobs check the flag between partitions and dates, and the remote client
/// checks it between retries; a cancelled job returns the partial report
/// gathered so far.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One sync job's collaborators and state.
pub struct SyncEngine {
    warehouse: Warehouse,
    client: RemoteClient,
    lookups: LookupCache,
    config: SyncConfig,
    cancel: CancelFlag,
    today: Option<TradeDate>,
}

impl SyncEngine {
    pub fn new(warehouse: Warehouse, mut client: RemoteClient) -> Self {
        let cancel = CancelFlag::new();
        client.set_cancel_flag(cancel.clone());
        Self {
            warehouse,
            client,
            lookups: LookupCache::new(),
            config: SyncConfig::default(),
            cancel,
            today: None,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Share `cancel` with the engine and its client.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.client.set_cancel_flag(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Pin "today" instead of reading the clock. Used for reproducible runs.
    pub fn with_today(mut self, today: TradeDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn lookups(&self) -> &LookupCache {
        &self.lookups
    }

    pub fn lookups_mut(&mut self) -> &mut LookupCache {
        &mut self.lookups
    }

    pub fn client_mut(&mut self) -> &mut RemoteClient {
        &mut self.client
    }

    fn today(&self) -> TradeDate {
        self.today.unwrap_or_else(TradeDate::today)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Append a run to the sync log. A failed log write never fails the run.
    fn record_run(&self, run: RunLog<'_>) {
        let record = SyncLogRecord {
            run_id: run.run_id.to_string(),
            job: run.job.to_string(),
            market: run.market.map(str::to_string),
            created: count(run.created),
            updated: count(run.updated),
            skipped: count(run.skipped),
            failed: count(run.failed),
            cancelled: run.cancelled,
            started_at: run.started_at.to_string(),
        };
        if let Err(error) = self.warehouse.record_sync_run(&record) {
            warn!(job = run.job, error = %error, "could not record sync run");
        }
    }
}

/// Counters handed to `record_run`.
struct RunLog<'a> {
    run_id: &'a str,
    job: &'a str,
    market: Option<&'a str>,
    created: usize,
    updated: usize,
    skipped: usize,
    failed: usize,
    cancelled: bool,
    started_at: &'a str,
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`.
fn timestamp_now() -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    OffsetDateTime::now_utc()
        .format(format)
        .unwrap_or_else(|_| String::from("1970-01-01 00:00:00"))
}

/// `None` for blank strings, trimmed text otherwise.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
