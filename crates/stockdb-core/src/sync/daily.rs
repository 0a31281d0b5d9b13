//! Daily bar sync.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use stockdb_warehouse::{FailedPeriodWrite, StockPeriodRecord};
use tracing::{debug, info, warn};

use crate::domain::{RemoteSymbol, TradeDate};
use crate::error::{SyncError, ValidationError};
use crate::lookup::LookupKind;
use crate::remote::{DailyRequest, DailyRow, RemoteTable, TradeCalendarRequest};
use crate::sync::{new_run_id, timestamp_now, RunLog, SyncEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySyncOptions {
    /// Local market code; `None` syncs every market with a provider acronym.
    pub market: Option<String>,
    /// First date to sync. Defaults to the day after the latest stored bar.
    pub start: Option<TradeDate>,
    /// Last date to sync. Defaults to today.
    pub end: Option<TradeDate>,
    /// Explicit dates; when set, `start` and `end` are ignored and the
    /// calendar is not consulted.
    pub dates: Vec<TradeDate>,
    /// Local stock codes to limit the run to.
    pub stocks: Vec<String>,
    /// Rewrite bars on dates that already have stored bars.
    pub update: bool,
    /// Rebuild lookups before the run.
    pub clear_lookups: bool,
}

impl Default for DailySyncOptions {
    fn default() -> Self {
        Self {
            market: None,
            start: None,
            end: None,
            dates: Vec::new(),
            stocks: Vec::new(),
            update: false,
            clear_lookups: true,
        }
    }
}

/// A provider bar that could not be translated to a local stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBar {
    pub remote_code: String,
    pub date: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailySyncReport {
    pub run_id: String,
    pub markets: Vec<String>,
    /// Trading dates processed across all markets.
    pub dates: usize,
    pub created: usize,
    pub updated: usize,
    /// Bars on already-stored dates left alone because updates were off.
    pub untouched: usize,
    pub skipped: Vec<SkippedBar>,
    pub failed: Vec<FailedPeriodWrite>,
    pub cancelled: bool,
}

/// A market selected for a run and the provider symbols it is limited to.
struct MarketScope {
    code: String,
    acronym: String,
    /// Empty means every symbol the provider reports.
    symbols: Vec<String>,
}

impl SyncEngine {
    /// Fetch daily bars per market and date and write them.
    ///
    /// Dates are processed in ascending order per market. Bars on dates with
    /// no stored data are created; bars on known dates are only rewritten
    /// when `update` is set. Write failures are isolated per bar and land in
    /// [`DailySyncReport::failed`]; provider rows that do not decode land in
    /// [`DailySyncReport::skipped`].
    pub async fn sync_daily(
        &mut self,
        options: &DailySyncOptions,
    ) -> Result<DailySyncReport, SyncError> {
        let started_at = timestamp_now();
        let mut report = DailySyncReport {
            run_id: new_run_id(),
            ..DailySyncReport::default()
        };

        self.daily_pass(options, &mut report).await?;

        self.record_run(RunLog {
            run_id: &report.run_id,
            job: "daily",
            market: options.market.as_deref(),
            created: report.created,
            updated: report.updated,
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            cancelled: report.cancelled,
            started_at: &started_at,
        });
        Ok(report)
    }

    /// Open trading dates for a market between two dates, ascending.
    pub async fn trading_dates(
        &mut self,
        acronym: &str,
        start: TradeDate,
        end: TradeDate,
    ) -> Result<Vec<TradeDate>, SyncError> {
        if start > end {
            return Ok(Vec::new());
        }

        let request = TradeCalendarRequest {
            exchange: acronym.to_string(),
            start_date: start,
            end_date: end,
            open_only: true,
        };
        let rows = self.client.call(&request).await?;

        let mut dates = BTreeSet::new();
        for row in rows.iter().filter(|row| row.is_open) {
            let date = TradeDate::parse(&row.cal_date)?;
            if (start..=end).contains(&date) {
                dates.insert(date);
            }
        }
        Ok(dates.into_iter().collect())
    }

    pub(crate) async fn daily_pass(
        &mut self,
        options: &DailySyncOptions,
        report: &mut DailySyncReport,
    ) -> Result<(), SyncError> {
        if let (Some(start), Some(end)) = (options.start, options.end) {
            if start > end {
                return Err(ValidationError::InvertedDateRange {
                    start: start.compact(),
                    end: end.compact(),
                }
                .into());
            }
        }

        if options.clear_lookups {
            self.lookups.invalidate(&[
                LookupKind::Markets,
                LookupKind::Stocks,
                LookupKind::PeriodDates,
            ]);
        }

        let scopes = self.market_scopes(options, report)?;
        for scope in &scopes {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.markets.push(scope.code.clone());

            let dates = match self.resolve_dates(scope, options).await {
                Ok(dates) => dates,
                Err(error) if error.is_cancelled() => {
                    report.cancelled = true;
                    break;
                }
                Err(error) => return Err(error),
            };
            info!(
                market = %scope.code,
                dates = dates.len(),
                symbols = scope.symbols.len(),
                "syncing daily bars"
            );

            for date in dates {
                if self.is_cancelled() {
                    info!(market = %scope.code, date = %date, "daily sync cancelled");
                    report.cancelled = true;
                    break;
                }
                match self.sync_date(scope, date, options.update, report).await {
                    Ok(()) => report.dates += 1,
                    Err(error) if error.is_cancelled() => {
                        info!(market = %scope.code, date = %date, "daily sync cancelled");
                        report.cancelled = true;
                        break;
                    }
                    Err(error) => return Err(error),
                }
            }

            if report.cancelled {
                break;
            }
        }

        self.lookups.invalidate(&[LookupKind::PeriodDates]);
        Ok(())
    }

    /// Markets to sync, each with its symbol subset when stocks were named.
    fn market_scopes(
        &mut self,
        options: &DailySyncOptions,
        report: &mut DailySyncReport,
    ) -> Result<Vec<MarketScope>, SyncError> {
        let markets = match options.market.as_deref() {
            Some(code) => {
                let acronym = self
                    .lookups
                    .market_acronym(&self.warehouse, code)?
                    .ok_or_else(|| ValidationError::UnknownMarket {
                        value: code.to_string(),
                    })?;
                vec![(code.to_string(), acronym)]
            }
            None => self.lookups.mapped_markets(&self.warehouse)?,
        };

        if options.stocks.is_empty() {
            return Ok(markets
                .into_iter()
                .map(|(code, acronym)| MarketScope {
                    code,
                    acronym,
                    symbols: Vec::new(),
                })
                .collect());
        }

        let mut symbols_by_market: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for stock in &options.stocks {
            let remote = self.lookups.stock_remote_code(&self.warehouse, stock)?;
            let market = self.lookups.stock_market(&self.warehouse, stock)?;
            match (remote, market) {
                (Some(remote), Some(market)) => {
                    symbols_by_market.entry(market).or_default().insert(remote);
                }
                _ => report.skipped.push(SkippedBar {
                    remote_code: stock.clone(),
                    date: String::new(),
                    reason: String::from("unknown stock"),
                }),
            }
        }

        let mut scopes = Vec::new();
        for (code, acronym) in markets {
            if let Some(symbols) = symbols_by_market.remove(&code) {
                scopes.push(MarketScope {
                    code,
                    acronym,
                    symbols: symbols.into_iter().collect(),
                });
            }
        }
        for (market, symbols) in symbols_by_market {
            for symbol in symbols {
                report.skipped.push(SkippedBar {
                    remote_code: symbol,
                    date: String::new(),
                    reason: format!("stock is listed on {market}, outside this run"),
                });
            }
        }
        Ok(scopes)
    }

    async fn resolve_dates(
        &mut self,
        scope: &MarketScope,
        options: &DailySyncOptions,
    ) -> Result<Vec<TradeDate>, SyncError> {
        if !options.dates.is_empty() {
            let dates: BTreeSet<TradeDate> = options.dates.iter().copied().collect();
            return Ok(dates.into_iter().collect());
        }

        let start = match options.start {
            Some(start) => start,
            None => match self
                .warehouse
                .latest_period_date(&self.config.period, &scope.code)?
            {
                Some(latest) => TradeDate::parse(&latest)?.next_day(),
                None => self.config.earliest_date,
            },
        };
        let end = options.end.unwrap_or_else(|| self.today());
        debug!(market = %scope.code, start = %start, end = %end, "resolved sync window");

        self.trading_dates(&scope.acronym, start, end).await
    }

    async fn sync_date(
        &mut self,
        scope: &MarketScope,
        date: TradeDate,
        update: bool,
        report: &mut DailySyncReport,
    ) -> Result<(), SyncError> {
        let tables = self.fetch_bars(scope, date).await?;
        let iso = date.iso();
        let known =
            self.lookups
                .is_known_date(&self.warehouse, &self.config.period, &scope.code, &iso)?;

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        let mut skipped = 0;
        let rows = tables.iter().flat_map(|table| {
            table
                .decode_each::<DailyRow>()
                .into_iter()
                .enumerate()
                .map(move |(index, decoded)| (table, index, decoded))
        });
        for (table, index, decoded) in rows {
            let row = match decoded {
                Ok(row) => row,
                Err(error) => {
                    let remote_code = table.text(index, "ts_code").unwrap_or_default();
                    if listed_elsewhere(remote_code, &scope.acronym) {
                        continue;
                    }
                    warn!(
                        remote_code,
                        date = %date,
                        error = %error,
                        "provider bar did not decode"
                    );
                    skipped += 1;
                    report.skipped.push(SkippedBar {
                        remote_code: remote_code.to_string(),
                        date: date.compact(),
                        reason: format!("malformed provider row: {}", error.message()),
                    });
                    continue;
                }
            };
            if symbol_acronym(&row.ts_code) != Some(scope.acronym.as_str()) {
                continue;
            }
            let Some(stock) = self.lookups.stock_code(&self.warehouse, &row.ts_code)? else {
                skipped += 1;
                report.skipped.push(SkippedBar {
                    remote_code: row.ts_code.clone(),
                    date: date.compact(),
                    reason: String::from("no local stock for symbol"),
                });
                continue;
            };

            let bar = bar_record(stock, &self.config.period, &scope.code, &iso, &row);
            match (known, update) {
                (false, _) => creates.push(bar),
                (true, true) => updates.push(bar),
                (true, false) => report.untouched += 1,
            }
        }

        let batch_size = self.config.batch_size;
        let failed_before = report.failed.len();
        for batch in creates.chunks(batch_size) {
            let outcome = self.warehouse.upsert_stock_periods(batch)?;
            report.created += outcome.written;
            report.failed.extend(outcome.failed);
        }
        for batch in updates.chunks(batch_size) {
            let outcome = self.warehouse.upsert_stock_periods(batch)?;
            report.updated += outcome.written;
            report.failed.extend(outcome.failed);
        }

        for failure in &report.failed[failed_before..] {
            warn!(
                stock = %failure.stock,
                date = %failure.date,
                reason = %failure.reason,
                "bar write failed"
            );
        }
        info!(
            market = %scope.code,
            date = %date,
            created = creates.len(),
            updated = updates.len(),
            skipped,
            failed = report.failed.len() - failed_before,
            "daily bars written"
        );
        Ok(())
    }

    /// Raw bar tables for one date, chunked by symbol when the scope names
    /// symbols. Rows are decoded by the caller so one bad row stays local.
    async fn fetch_bars(
        &mut self,
        scope: &MarketScope,
        date: TradeDate,
    ) -> Result<Vec<RemoteTable>, SyncError> {
        if scope.symbols.is_empty() {
            let request = DailyRequest {
                trade_date: date,
                ts_codes: Vec::new(),
            };
            return Ok(vec![self.client.call_table(&request).await?]);
        }

        let mut tables = Vec::new();
        for chunk in scope.symbols.chunks(self.config.symbols_per_call) {
            let request = DailyRequest {
                trade_date: date,
                ts_codes: chunk.to_vec(),
            };
            tables.push(self.client.call_table(&request).await?);
        }
        Ok(tables)
    }
}

/// Provider acronym of a symbol's exchange, if the symbol parses.
pub(crate) fn symbol_acronym(symbol: &str) -> Option<&'static str> {
    RemoteSymbol::parse(symbol)
        .and_then(|parsed| parsed.acronym())
        .ok()
}

/// The symbol parses and belongs to an exchange other than `acronym`.
fn listed_elsewhere(symbol: &str, acronym: &str) -> bool {
    symbol_acronym(symbol).is_some_and(|found| found != acronym)
}

fn bar_record(
    stock: String,
    period: &str,
    market: &str,
    iso_date: &str,
    row: &DailyRow,
) -> StockPeriodRecord {
    StockPeriodRecord {
        stock,
        period: period.to_string(),
        market: market.to_string(),
        date: iso_date.to_string(),
        open: row.open,
        high: row.high,
        low: row.low,
        close: row.close,
        pre_close: row.pre_close,
        change: row.change,
        percent: row.pct_chg,
        volume: row.vol,
        amount: row.amount,
    }
}
