//! Row shapes exchanged with the warehouse.
//!
//! Dates are carried as ISO `YYYY-MM-DD` strings and cast inside SQL, the same
//! way timestamps are handled elsewhere in the warehouse.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// An exchange or trading venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Local market code (MIC style, e.g. `XSHG`).
    pub code: String,
    pub name: String,
    /// Identifier the remote provider uses for the same market.
    #[serde(default)]
    pub acronym: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub opened_on: Option<String>,
}

/// A board or segment within a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub code: String,
    pub name: String,
    #[serde(default = "default_subject_level")]
    pub level: i32,
    pub market: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub opened_on: Option<String>,
}

fn default_subject_level() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub code: String,
    pub name: String,
}

/// Mutable and immutable fields of a listed instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub code: String,
    pub native_code: String,
    pub remote_code: String,
    pub isin: Option<String>,
    pub name: String,
    pub market: String,
    pub subject: Option<String>,
    pub firm: Option<String>,
    pub status: String,
    pub is_listed: bool,
    pub listed_on: Option<String>,
    pub delisted_on: Option<String>,
}

/// An instrument as stored, including its surrogate key and audit stamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredStock {
    pub id: i64,
    #[serde(flatten)]
    pub record: StockRecord,
    pub created_at: String,
    pub updated_at: String,
}

/// The identifier columns of an instrument, used to build translation tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockKey {
    pub id: i64,
    pub code: String,
    pub remote_code: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub code: String,
    pub native_code: String,
    pub remote_code: String,
    pub name: String,
    pub market: Option<String>,
    pub publisher: Option<String>,
    pub category: Option<String>,
    pub base_date: Option<String>,
    pub listed_on: Option<String>,
}

/// One price bar for an (instrument, period, date) key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockPeriodRecord {
    pub stock: String,
    pub period: String,
    pub market: String,
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub pre_close: Option<f64>,
    pub change: Option<f64>,
    pub percent: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredStockPeriod {
    #[serde(flatten)]
    pub record: StockPeriodRecord,
    pub created_at: String,
    pub updated_at: String,
}

/// A bar write that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPeriodWrite {
    pub stock: String,
    pub date: String,
    pub reason: String,
}

/// Outcome of a bar write batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodWriteOutcome {
    pub written: usize,
    pub failed: Vec<FailedPeriodWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCoverage {
    pub period: String,
    pub market: String,
    pub date: String,
    pub row_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingSummary {
    pub market: String,
    pub status: String,
    pub instrument_count: i64,
    pub listed_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigRecord {
    pub code: String,
    pub name: Option<String>,
    pub value: String,
    pub updated_at: String,
}

/// One completed synchronizer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncLogRecord {
    pub run_id: String,
    pub job: String,
    pub market: Option<String>,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: bool,
    /// Start time, `YYYY-MM-DD HH:MM:SS` in UTC.
    pub started_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncHistoryEntry {
    #[serde(flatten)]
    pub run: SyncLogRecord,
    pub finished_at: String,
    pub duration_ms: i64,
}
