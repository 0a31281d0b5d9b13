//! # Stockdb Warehouse
//!
//! DuckDB-backed storage for market reference data and daily price bars.
//!
//! ## Overview
//!
//! The warehouse is the storage collaborator of the synchronizers in
//! `stockdb-core`. It owns the schema, enforces the natural-key uniqueness
//! constraints, and exposes the bulk writes and filtered reads the sync jobs
//! need. It deliberately offers no general query surface.
//!
//! ```rust,no_run
//! use stockdb_warehouse::{MarketRecord, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     warehouse.upsert_markets(&[MarketRecord {
//!         code: "XSHG".to_string(),
//!         name: "Shanghai Stock Exchange".to_string(),
//!         acronym: Some("SSE".to_string()),
//!         region: None,
//!         currency: Some("CNY".to_string()),
//!         website: None,
//!         opened_on: Some("1990-12-19".to_string()),
//!     }])?;
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `configs` | Key/value settings (provider token, ...) |
//! | `currencies`, `regions`, `firms` | Slow-changing reference data |
//! | `markets` | Exchanges, keyed by local code and provider acronym |
//! | `subjects` | Boards/segments within a market |
//! | `periods` | Sampling granularities |
//! | `stocks` | Instrument master data |
//! | `stock_periods` | One bar per (stock, period, date) |
//! | `indexes` | Index master data |
//! | `sync_log` | One row per synchronizer run |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `vw_period_coverage` | Bar count per period, market and date |
//! | `vw_listing_summary` | Instrument count per market and status |
//! | `vw_sync_history` | Sync runs with duration |

pub mod duckdb;
pub mod migrations;
pub mod records;
pub mod views;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, Row, ToSql};
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};
pub use records::{
    ConfigRecord, CurrencyRecord, FailedPeriodWrite, FirmRecord, IndexRecord, ListingSummary,
    MarketRecord, PeriodCoverage, PeriodRecord, PeriodWriteOutcome, RegionRecord, StockKey,
    StockPeriodRecord, StockRecord, StoredStock, StoredStockPeriod, SubjectRecord,
    SyncHistoryEntry, SyncLogRecord,
};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A write was refused before reaching the database.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for stockdb data.
    pub stockdb_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let stockdb_home = resolve_stockdb_home();
        let db_path = stockdb_home.join("warehouse.duckdb");
        Self {
            stockdb_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn at(stockdb_home: impl Into<PathBuf>) -> Self {
        let stockdb_home = stockdb_home.into();
        let db_path = stockdb_home.join("warehouse.duckdb");
        Self {
            stockdb_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// The storage interface for reference data and price bars.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Initialize database schema and views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    // ---------------------------------------------------------------------
    // Reference data
    // ---------------------------------------------------------------------

    pub fn upsert_currencies(&self, rows: &[CurrencyRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    pub fn upsert_regions(&self, rows: &[RegionRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    pub fn upsert_firms(&self, rows: &[FirmRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    /// Create or update markets by local code.
    ///
    /// The acronym is indexed and keeps the value it was created with. Fails if
    /// two markets would share an acronym.
    pub fn upsert_markets(&self, rows: &[MarketRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    pub fn upsert_subjects(&self, rows: &[SubjectRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    pub fn upsert_periods(&self, rows: &[PeriodRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    pub fn list_markets(&self) -> Result<Vec<MarketRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT code, name, acronym, region, currency, website, CAST(opened_on AS VARCHAR) \
             FROM markets ORDER BY code",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(MarketRecord {
                code: row.get(0)?,
                name: row.get(1)?,
                acronym: row.get(2)?,
                region: row.get(3)?,
                currency: row.get(4)?,
                website: row.get(5)?,
                opened_on: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_subjects(&self) -> Result<Vec<SubjectRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT code, name, level, market, parent, CAST(opened_on AS VARCHAR) \
             FROM subjects ORDER BY market, level, code",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(SubjectRecord {
                code: row.get(0)?,
                name: row.get(1)?,
                level: row.get(2)?,
                market: row.get(3)?,
                parent: row.get(4)?,
                opened_on: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---------------------------------------------------------------------
    // Instruments
    // ---------------------------------------------------------------------

    /// Identifier columns of every stored instrument, optionally limited to one market.
    pub fn list_stock_keys(&self, market: Option<&str>) -> Result<Vec<StockKey>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut sql = String::from("SELECT id, code, remote_code, market FROM stocks");
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(market) = market.as_ref() {
            sql.push_str(" WHERE market = ?");
            params.push(market);
        }
        sql.push_str(" ORDER BY code");

        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(StockKey {
                id: row.get(0)?,
                code: row.get(1)?,
                remote_code: row.get(2)?,
                market: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_stock(&self, code: &str) -> Result<Option<StoredStock>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT id, code, native_code, remote_code, isin, name, market, subject, firm, \
             status, is_listed, CAST(listed_on AS VARCHAR), CAST(delisted_on AS VARCHAR), \
             CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) \
             FROM stocks WHERE code = ?",
        )?;
        let params: [&dyn ToSql; 1] = [&code];
        let mut rows = statement.query_map(params.as_slice(), read_stored_stock)?;
        Ok(rows.next().transpose()?)
    }

    /// Insert new instruments in a single transaction.
    pub fn insert_stocks(&self, rows: &[StockRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 12] = [
                    &row.code,
                    &row.native_code,
                    &row.remote_code,
                    &row.isin,
                    &row.name,
                    &row.market,
                    &row.subject,
                    &row.firm,
                    &row.status,
                    &row.is_listed,
                    &row.listed_on,
                    &row.delisted_on,
                ];
                connection.execute(
                    "INSERT INTO stocks \
                     (code, native_code, remote_code, isin, name, market, subject, firm, \
                      status, is_listed, listed_on, delisted_on) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                      TRY_CAST(? AS DATE), TRY_CAST(? AS DATE))",
                    params.as_slice(),
                )?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Update the mutable fields of existing instruments, addressed by primary key.
    ///
    /// `code`, `market` and `created_at` are never touched.
    pub fn update_stocks(&self, rows: &[(i64, StockRecord)]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut updated = 0;
            for (id, row) in rows {
                let params: [&dyn ToSql; 11] = [
                    &row.native_code,
                    &row.remote_code,
                    &row.isin,
                    &row.name,
                    &row.subject,
                    &row.firm,
                    &row.status,
                    &row.is_listed,
                    &row.listed_on,
                    &row.delisted_on,
                    id,
                ];
                updated += connection.execute(
                    "UPDATE stocks SET \
                     native_code = ?, remote_code = ?, isin = COALESCE(?, isin), name = ?, \
                     subject = ?, firm = COALESCE(?, firm), status = ?, is_listed = ?, \
                     listed_on = TRY_CAST(? AS DATE), delisted_on = TRY_CAST(? AS DATE), \
                     updated_at = now() \
                     WHERE id = ?",
                    params.as_slice(),
                )?;
            }
            Ok(updated)
        })();

        finalize_transaction(&connection, result)
    }

    pub fn index_codes(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT code FROM indexes ORDER BY code")?;
        let rows = statement.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn upsert_indexes(&self, rows: &[IndexRecord]) -> Result<usize, WarehouseError> {
        self.upsert_all(rows)
    }

    // ---------------------------------------------------------------------
    // Price bars
    // ---------------------------------------------------------------------

    /// Latest stored bar date (ISO) for a period and market.
    pub fn latest_period_date(
        &self,
        period: &str,
        market: &str,
    ) -> Result<Option<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 2] = [&period, &market];
        let latest = connection.query_row(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM stock_periods WHERE period = ? AND market = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    /// Distinct stored bar dates (ISO, ascending) for a period and market.
    pub fn period_dates(&self, period: &str, market: &str) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT DISTINCT CAST(date AS VARCHAR) AS d FROM stock_periods \
             WHERE period = ? AND market = ? ORDER BY d",
        )?;
        let params: [&dyn ToSql; 2] = [&period, &market];
        let rows = statement.query_map(params.as_slice(), |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// `(date, stock)` pairs stored for a period and market, optionally bounded by
    /// inclusive ISO dates.
    pub fn period_stocks(
        &self,
        period: &str,
        market: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<(String, String)>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut sql = String::from(
            "SELECT CAST(date AS VARCHAR) AS d, stock FROM stock_periods \
             WHERE period = ? AND market = ?",
        );
        let mut params: Vec<&dyn ToSql> = vec![&period, &market];
        if let Some(start) = start.as_ref() {
            sql.push_str(" AND date >= CAST(? AS DATE)");
            params.push(start);
        }
        if let Some(end) = end.as_ref() {
            sql.push_str(" AND date <= CAST(? AS DATE)");
            params.push(end);
        }
        sql.push_str(" ORDER BY d, stock");

        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_stock_period(
        &self,
        stock: &str,
        period: &str,
        date: &str,
    ) -> Result<Option<StoredStockPeriod>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT stock, period, market, CAST(date AS VARCHAR), open, high, low, close, \
             pre_close, change, percent, volume, amount, \
             CAST(created_at AS VARCHAR), CAST(updated_at AS VARCHAR) \
             FROM stock_periods WHERE stock = ? AND period = ? AND date = CAST(? AS DATE)",
        )?;
        let params: [&dyn ToSql; 3] = [&stock, &period, &date];
        let mut rows = statement.query_map(params.as_slice(), read_stored_stock_period)?;
        Ok(rows.next().transpose()?)
    }

    /// Write bars keyed by (stock, period, date), updating in place on conflict.
    ///
    /// The batch is applied in one transaction. If that fails, it is rolled back
    /// and replayed row by row so that only the offending rows are reported in
    /// [`PeriodWriteOutcome::failed`].
    pub fn upsert_stock_periods(
        &self,
        rows: &[StockPeriodRecord],
    ) -> Result<PeriodWriteOutcome, WarehouseError> {
        if rows.is_empty() {
            return Ok(PeriodWriteOutcome::default());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for row in rows {
                upsert_stock_period(&connection, row)?;
            }
            Ok(rows.len())
        })();

        match finalize_transaction(&connection, result) {
            Ok(written) => Ok(PeriodWriteOutcome {
                written,
                failed: Vec::new(),
            }),
            Err(WarehouseError::DuckDb(_)) => {
                let mut outcome = PeriodWriteOutcome::default();
                for row in rows {
                    match upsert_stock_period(&connection, row) {
                        Ok(()) => outcome.written += 1,
                        Err(error) => outcome.failed.push(FailedPeriodWrite {
                            stock: row.stock.clone(),
                            date: row.date.clone(),
                            reason: error.to_string(),
                        }),
                    }
                }
                Ok(outcome)
            }
            Err(error) => Err(error),
        }
    }

    /// Delete the bars of the given stocks on one date. Returns the number of rows removed.
    pub fn delete_stock_periods(
        &self,
        period: &str,
        date: &str,
        stocks: &[String],
    ) -> Result<usize, WarehouseError> {
        if stocks.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut deleted = 0;
            for stock in stocks {
                let params: [&dyn ToSql; 3] = [stock, &period, &date];
                deleted += connection.execute(
                    "DELETE FROM stock_periods \
                     WHERE stock = ? AND period = ? AND date = CAST(? AS DATE)",
                    params.as_slice(),
                )?;
            }
            Ok(deleted)
        })();

        finalize_transaction(&connection, result)
    }

    pub fn period_coverage(
        &self,
        period: &str,
        market: Option<&str>,
    ) -> Result<Vec<PeriodCoverage>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut sql = String::from(
            "SELECT period, market, CAST(date AS VARCHAR) AS d, row_count \
             FROM vw_period_coverage WHERE period = ?",
        );
        let mut params: Vec<&dyn ToSql> = vec![&period];
        if let Some(market) = market.as_ref() {
            sql.push_str(" AND market = ?");
            params.push(market);
        }
        sql.push_str(" ORDER BY market, d");

        let mut statement = connection.prepare(sql.as_str())?;
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(PeriodCoverage {
                period: row.get(0)?,
                market: row.get(1)?,
                date: row.get(2)?,
                row_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn listing_summary(&self) -> Result<Vec<ListingSummary>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT market, status, instrument_count, CAST(listed_count AS BIGINT) \
             FROM vw_listing_summary ORDER BY market, status",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(ListingSummary {
                market: row.get(0)?,
                status: row.get(1)?,
                instrument_count: row.get(2)?,
                listed_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ---------------------------------------------------------------------
    // Settings and audit
    // ---------------------------------------------------------------------

    pub fn config_value(&self, code: &str) -> Result<Option<ConfigRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT code, name, value, CAST(updated_at AS VARCHAR) FROM configs WHERE code = ?",
        )?;
        let params: [&dyn ToSql; 1] = [&code];
        let mut rows = statement.query_map(params.as_slice(), |row| {
            Ok(ConfigRecord {
                code: row.get(0)?,
                name: row.get(1)?,
                value: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?;
        Ok(rows.next().transpose()?)
    }

    pub fn set_config_value(
        &self,
        code: &str,
        name: Option<&str>,
        value: &str,
    ) -> Result<(), WarehouseError> {
        if code.trim().is_empty() {
            return Err(WarehouseError::Rejected(String::from(
                "config code cannot be empty",
            )));
        }

        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 3] = [&code, &name, &value];
        connection.execute(
            "INSERT INTO configs (code, name, value) VALUES (?, ?, ?) \
             ON CONFLICT (code) DO UPDATE SET \
             name = COALESCE(EXCLUDED.name, configs.name), value = EXCLUDED.value, \
             updated_at = now()",
            params.as_slice(),
        )?;
        Ok(())
    }

    pub fn record_sync_run(&self, run: &SyncLogRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let counts = [run.created, run.updated, run.skipped, run.failed]
            .map(|count| i64::try_from(count).unwrap_or(i64::MAX));
        let params: [&dyn ToSql; 9] = [
            &run.run_id,
            &run.job,
            &run.market,
            &counts[0],
            &counts[1],
            &counts[2],
            &counts[3],
            &run.cancelled,
            &run.started_at,
        ];
        connection.execute(
            "INSERT INTO sync_log \
             (run_id, job, market, created, updated, skipped, failed, cancelled, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Most recent sync runs, newest first.
    pub fn sync_history(&self, limit: usize) -> Result<Vec<SyncHistoryEntry>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = connection.prepare(
            "SELECT run_id, job, market, created, updated, skipped, failed, cancelled, \
             CAST(started_at AS VARCHAR), CAST(finished_at AS VARCHAR), duration_ms \
             FROM vw_sync_history ORDER BY started_at DESC LIMIT ?",
        )?;
        let params: [&dyn ToSql; 1] = [&limit];
        let rows = statement.query_map(params.as_slice(), |row| {
            let count = |index: usize| -> Result<u64, ::duckdb::Error> {
                let value: i64 = row.get(index)?;
                Ok(u64::try_from(value).unwrap_or_default())
            };
            Ok(SyncHistoryEntry {
                run: SyncLogRecord {
                    run_id: row.get(0)?,
                    job: row.get(1)?,
                    market: row.get(2)?,
                    created: count(3)?,
                    updated: count(4)?,
                    skipped: count(5)?,
                    failed: count(6)?,
                    cancelled: row.get(7)?,
                    started_at: row.get(8)?,
                },
                finished_at: row.get(9)?,
                duration_ms: row.get(10)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn upsert_all<T: Upsert>(&self, rows: &[T]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for row in rows {
                connection.execute(T::SQL, row.params().as_slice())?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }
}

/// A record written with `INSERT ... ON CONFLICT DO UPDATE` on its natural key.
trait Upsert {
    const SQL: &'static str;

    fn params(&self) -> Vec<&dyn ToSql>;
}

impl Upsert for CurrencyRecord {
    const SQL: &'static str = "INSERT INTO currencies (code, name) VALUES (?, ?) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.code, &self.name]
    }
}

impl Upsert for RegionRecord {
    const SQL: &'static str = "INSERT INTO regions (code, name, level, parent) VALUES (?, ?, ?, ?) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, level = EXCLUDED.level, \
        parent = EXCLUDED.parent, updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.code, &self.name, &self.level, &self.parent]
    }
}

impl Upsert for FirmRecord {
    const SQL: &'static str = "INSERT INTO firms (code, name, region) VALUES (?, ?, ?) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, region = EXCLUDED.region, \
        updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.code, &self.name, &self.region]
    }
}

impl Upsert for MarketRecord {
    const SQL: &'static str = "INSERT INTO markets \
        (code, name, acronym, region, currency, website, opened_on) \
        VALUES (?, ?, ?, ?, ?, ?, TRY_CAST(? AS DATE)) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, \
        region = EXCLUDED.region, currency = EXCLUDED.currency, website = EXCLUDED.website, \
        opened_on = EXCLUDED.opened_on, updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.code,
            &self.name,
            &self.acronym,
            &self.region,
            &self.currency,
            &self.website,
            &self.opened_on,
        ]
    }
}

impl Upsert for SubjectRecord {
    const SQL: &'static str = "INSERT INTO subjects \
        (code, name, level, market, parent, opened_on) \
        VALUES (?, ?, ?, ?, ?, TRY_CAST(? AS DATE)) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, level = EXCLUDED.level, \
        market = EXCLUDED.market, parent = EXCLUDED.parent, opened_on = EXCLUDED.opened_on, \
        updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.code,
            &self.name,
            &self.level,
            &self.market,
            &self.parent,
            &self.opened_on,
        ]
    }
}

impl Upsert for PeriodRecord {
    const SQL: &'static str = "INSERT INTO periods (code, name) VALUES (?, ?) \
        ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.code, &self.name]
    }
}

impl Upsert for IndexRecord {
    const SQL: &'static str = "INSERT INTO indexes \
        (code, native_code, remote_code, name, market, publisher, category, base_date, listed_on) \
        VALUES (?, ?, ?, ?, ?, ?, ?, TRY_CAST(? AS DATE), TRY_CAST(? AS DATE)) \
        ON CONFLICT (code) DO UPDATE SET native_code = EXCLUDED.native_code, \
        remote_code = EXCLUDED.remote_code, name = EXCLUDED.name, market = EXCLUDED.market, \
        publisher = EXCLUDED.publisher, category = EXCLUDED.category, \
        base_date = EXCLUDED.base_date, listed_on = EXCLUDED.listed_on, \
        updated_at = now()";

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.code,
            &self.native_code,
            &self.remote_code,
            &self.name,
            &self.market,
            &self.publisher,
            &self.category,
            &self.base_date,
            &self.listed_on,
        ]
    }
}

fn upsert_stock_period(
    connection: &Connection,
    row: &StockPeriodRecord,
) -> Result<(), WarehouseError> {
    let params: [&dyn ToSql; 13] = [
        &row.stock,
        &row.period,
        &row.date,
        &row.market,
        &row.open,
        &row.high,
        &row.low,
        &row.close,
        &row.pre_close,
        &row.change,
        &row.percent,
        &row.volume,
        &row.amount,
    ];
    connection.execute(
        "INSERT INTO stock_periods \
         (stock, period, date, market, open, high, low, close, pre_close, change, percent, \
          volume, amount) \
         VALUES (?, ?, TRY_CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (stock, period, date) DO UPDATE SET \
         open = EXCLUDED.open, high = EXCLUDED.high, \
         low = EXCLUDED.low, close = EXCLUDED.close, pre_close = EXCLUDED.pre_close, \
         change = EXCLUDED.change, percent = EXCLUDED.percent, volume = EXCLUDED.volume, \
         amount = EXCLUDED.amount, updated_at = now()",
        params.as_slice(),
    )?;
    Ok(())
}

fn read_stored_stock(row: &Row<'_>) -> Result<StoredStock, ::duckdb::Error> {
    Ok(StoredStock {
        id: row.get(0)?,
        record: StockRecord {
            code: row.get(1)?,
            native_code: row.get(2)?,
            remote_code: row.get(3)?,
            isin: row.get(4)?,
            name: row.get(5)?,
            market: row.get(6)?,
            subject: row.get(7)?,
            firm: row.get(8)?,
            status: row.get(9)?,
            is_listed: row.get(10)?,
            listed_on: row.get(11)?,
            delisted_on: row.get(12)?,
        },
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn read_stored_stock_period(row: &Row<'_>) -> Result<StoredStockPeriod, ::duckdb::Error> {
    Ok(StoredStockPeriod {
        record: StockPeriodRecord {
            stock: row.get(0)?,
            period: row.get(1)?,
            market: row.get(2)?,
            date: row.get(3)?,
            open: row.get(4)?,
            high: row.get(5)?,
            low: row.get(6)?,
            close: row.get(7)?,
            pre_close: row.get(8)?,
            change: row.get(9)?,
            percent: row.get(10)?,
            volume: row.get(11)?,
            amount: row.get(12)?,
        },
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the stockdb home directory from environment or default.
fn resolve_stockdb_home() -> PathBuf {
    if let Some(path) = env::var_os("STOCKDB_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockdb");
    }

    PathBuf::from(".stockdb")
}
