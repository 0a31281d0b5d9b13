//! Coverage reconciliation between the provider and the warehouse.
//!
//! Both sides are reduced to the same shape, the set of provider symbols per
//! trading date (`YYYYMMDD`), and compared date by date. Symbols the provider
//! reports but the warehouse lacks are *missing*; symbols stored locally but
//! no longer reported are *extra*.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::TradeDate;
use crate::error::{SyncError, ValidationError};
use crate::lookup::LookupKind;
use crate::remote::DailyRequest;
use crate::sync::daily::symbol_acronym;
use crate::sync::{
    new_run_id, timestamp_now, DailySyncOptions, DailySyncReport, RunLog, SyncEngine,
};

/// Provider symbols per compact trading date.
pub type SymbolsByDate = BTreeMap<String, BTreeSet<String>>;

/// Per-date set differences between two coverage maps.
///
/// Returns `(missing, extra)` where `missing = remote - local` and
/// `extra = local - remote`. Dates whose difference is empty are left out.
pub fn diff_by_date(
    remote: &SymbolsByDate,
    local: &SymbolsByDate,
) -> (SymbolsByDate, SymbolsByDate) {
    (one_sided(remote, local), one_sided(local, remote))
}

fn one_sided(from: &SymbolsByDate, minus: &SymbolsByDate) -> SymbolsByDate {
    let empty = BTreeSet::new();
    from.iter()
        .filter_map(|(date, symbols)| {
            let other = minus.get(date).unwrap_or(&empty);
            let diff: BTreeSet<String> = symbols.difference(other).cloned().collect();
            (!diff.is_empty()).then(|| (date.clone(), diff))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumOptions {
    /// Local market code; `None` checks every market with a provider acronym.
    pub market: Option<String>,
    /// First audited date. Defaults to the earliest provider date.
    pub start: Option<TradeDate>,
    /// Last audited date. Defaults to today.
    pub end: Option<TradeDate>,
    /// Fetch and write missing bars.
    pub sync: bool,
    /// Delete extra bars.
    pub remove: bool,
}

/// Drift found in one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarketDrift {
    pub market: String,
    pub acronym: String,
    pub dates_checked: usize,
    pub missing_count: usize,
    pub extra_count: usize,
    pub missing: SymbolsByDate,
    pub extra: SymbolsByDate,
}

/// A repair or removal step that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairFailure {
    pub market: String,
    pub date: String,
    pub symbols: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChecksumReport {
    pub run_id: String,
    pub markets: Vec<MarketDrift>,
    /// Bars written while repairing missing coverage.
    pub repaired: usize,
    /// Bars deleted as extra.
    pub removed: usize,
    pub repair_failures: Vec<RepairFailure>,
    pub cancelled: bool,
}

/// Local coverage of one market plus the way back from provider symbol to
/// local stock code.
struct LocalCoverage {
    by_date: SymbolsByDate,
    stock_by_symbol: HashMap<String, String>,
}

impl SyncEngine {
    /// Compare provider and local coverage per trading date and optionally
    /// repair it.
    ///
    /// Every lookup is rebuilt once up front. A provider failure while
    /// collecting remote coverage aborts the whole run. Repairs and removals
    /// continue past individual failures, which are reported in
    /// [`ChecksumReport::repair_failures`].
    pub async fn checksum(
        &mut self,
        options: &ChecksumOptions,
    ) -> Result<ChecksumReport, SyncError> {
        let started_at = timestamp_now();
        let mut report = ChecksumReport {
            run_id: new_run_id(),
            ..ChecksumReport::default()
        };

        if let (Some(start), Some(end)) = (options.start, options.end) {
            if start > end {
                return Err(ValidationError::InvertedDateRange {
                    start: start.compact(),
                    end: end.compact(),
                }
                .into());
            }
        }

        self.lookups.invalidate_all();
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

        let mut side_maps = Vec::new();
        for (code, acronym) in markets {
            let Some(remote) = self.remote_coverage(&acronym, options).await? else {
                report.cancelled = true;
                break;
            };
            let local = self.local_coverage(&code, options)?;
            let (missing, extra) = diff_by_date(&remote.by_date, &local.by_date);

            let drift = MarketDrift {
                market: code,
                acronym,
                dates_checked: remote.dates,
                missing_count: missing.values().map(BTreeSet::len).sum(),
                extra_count: extra.values().map(BTreeSet::len).sum(),
                missing,
                extra,
            };
            info!(
                market = %drift.market,
                dates = drift.dates_checked,
                missing = drift.missing_count,
                extra = drift.extra_count,
                "coverage compared"
            );
            report.markets.push(drift);
            side_maps.push(local.stock_by_symbol);
        }

        if !report.cancelled {
            let drifts = report.markets.clone();
            for (drift, stock_by_symbol) in drifts.iter().zip(&side_maps) {
                if options.sync {
                    self.repair_missing(drift, &mut report).await;
                }
                if options.remove {
                    self.remove_extra(drift, stock_by_symbol, &mut report);
                }
                if self.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
            }
            if options.sync || options.remove {
                self.lookups.invalidate(&[LookupKind::PeriodDates]);
            }
        }

        self.record_run(RunLog {
            run_id: &report.run_id,
            job: "checksum",
            market: options.market.as_deref(),
            created: report.repaired,
            updated: 0,
            skipped: 0,
            failed: report.repair_failures.len(),
            cancelled: report.cancelled,
            started_at: &started_at,
        });
        Ok(report)
    }

    /// Provider symbols per open date, or `None` when cancelled midway.
    async fn remote_coverage(
        &mut self,
        acronym: &str,
        options: &ChecksumOptions,
    ) -> Result<Option<RemoteCoverage>, SyncError> {
        match self.collect_remote_coverage(acronym, options).await {
            Err(error) if error.is_cancelled() => Ok(None),
            other => other,
        }
    }

    async fn collect_remote_coverage(
        &mut self,
        acronym: &str,
        options: &ChecksumOptions,
    ) -> Result<Option<RemoteCoverage>, SyncError> {
        let start = options.start.unwrap_or(self.config.earliest_date);
        let end = options.end.unwrap_or_else(|| self.today());
        let dates = self.trading_dates(acronym, start, end).await?;
        info!(acronym, dates = dates.len(), "collecting provider coverage");

        let mut by_date = SymbolsByDate::new();
        for date in &dates {
            if self.is_cancelled() {
                return Ok(None);
            }
            let request = DailyRequest {
                trade_date: *date,
                ts_codes: Vec::new(),
            };
            // Only the symbol column matters here, so rows with bad prices
            // still count as reported.
            let table = self.client.call_table(&request).await?;
            let symbols: BTreeSet<String> = (0..table.items.len())
                .filter_map(|index| table.text(index, "ts_code"))
                .filter(|symbol| symbol_acronym(symbol) == Some(acronym))
                .map(str::to_string)
                .collect();
            by_date.insert(date.compact(), symbols);
        }

        Ok(Some(RemoteCoverage {
            dates: dates.len(),
            by_date,
        }))
    }

    fn local_coverage(
        &mut self,
        market: &str,
        options: &ChecksumOptions,
    ) -> Result<LocalCoverage, SyncError> {
        let start = options.start.map(TradeDate::iso);
        let end = options.end.map(TradeDate::iso);
        let pairs = self.warehouse.period_stocks(
            &self.config.period,
            market,
            start.as_deref(),
            end.as_deref(),
        )?;

        let mut coverage = LocalCoverage {
            by_date: SymbolsByDate::new(),
            stock_by_symbol: HashMap::new(),
        };
        for (date, stock) in pairs {
            let Some(symbol) = self.lookups.stock_remote_code(&self.warehouse, &stock)? else {
                warn!(stock = %stock, "stored bar has no stock mapping");
                continue;
            };
            let date = TradeDate::parse(&date)?.compact();
            coverage
                .by_date
                .entry(date)
                .or_default()
                .insert(symbol.clone());
            coverage.stock_by_symbol.insert(symbol, stock);
        }
        Ok(coverage)
    }

    async fn repair_missing(&mut self, drift: &MarketDrift, report: &mut ChecksumReport) {
        for (date, symbols) in &drift.missing {
            let Ok(trade_date) = TradeDate::parse(date) else {
                continue;
            };

            let mut stocks = Vec::new();
            let mut unmapped = Vec::new();
            for symbol in symbols {
                match self.lookups.stock_code(&self.warehouse, symbol) {
                    Ok(Some(stock)) => stocks.push(stock),
                    Ok(None) => unmapped.push(symbol.clone()),
                    Err(error) => {
                        report
                            .repair_failures
                            .push(failure(drift, date, vec![symbol.clone()], error));
                    }
                }
            }
            if !unmapped.is_empty() {
                report.repair_failures.push(RepairFailure {
                    market: drift.market.clone(),
                    date: date.clone(),
                    symbols: unmapped,
                    reason: String::from("no local stock for symbol"),
                });
            }
            if stocks.is_empty() {
                continue;
            }

            let options = DailySyncOptions {
                market: Some(drift.market.clone()),
                dates: vec![trade_date],
                stocks,
                update: true,
                clear_lookups: false,
                ..DailySyncOptions::default()
            };
            let mut pass = DailySyncReport::default();
            match self.daily_pass(&options, &mut pass).await {
                Ok(()) => {
                    report.repaired += pass.created + pass.updated;
                    for failed in pass.failed {
                        report.repair_failures.push(RepairFailure {
                            market: drift.market.clone(),
                            date: date.clone(),
                            symbols: vec![failed.stock],
                            reason: failed.reason,
                        });
                    }
                    info!(
                        market = %drift.market,
                        date = %date,
                        written = pass.created + pass.updated,
                        "missing bars repaired"
                    );
                }
                Err(error) => {
                    warn!(market = %drift.market, date = %date, error = %error, "repair failed");
                    report
                        .repair_failures
                        .push(failure(drift, date, symbols.iter().cloned().collect(), error));
                }
            }

            if self.is_cancelled() {
                return;
            }
        }
    }

    fn remove_extra(
        &self,
        drift: &MarketDrift,
        stock_by_symbol: &HashMap<String, String>,
        report: &mut ChecksumReport,
    ) {
        for (date, symbols) in &drift.extra {
            let stocks: Vec<String> = symbols
                .iter()
                .filter_map(|symbol| stock_by_symbol.get(symbol).cloned())
                .collect();
            let result = TradeDate::parse(date)
                .map_err(SyncError::from)
                .and_then(|trade_date| {
                    self.warehouse
                        .delete_stock_periods(&self.config.period, &trade_date.iso(), &stocks)
                        .map_err(SyncError::from)
                });

            match result {
                Ok(removed) => {
                    report.removed += removed;
                    info!(market = %drift.market, date = %date, removed, "extra bars removed");
                }
                Err(error) => {
                    warn!(market = %drift.market, date = %date, error = %error, "removal failed");
                    report
                        .repair_failures
                        .push(failure(drift, date, symbols.iter().cloned().collect(), error));
                }
            }
        }
    }
}

struct RemoteCoverage {
    dates: usize,
    by_date: SymbolsByDate,
}

fn failure(
    drift: &MarketDrift,
    date: &str,
    symbols: Vec<String>,
    error: impl std::fmt::Display,
) -> RepairFailure {
    RepairFailure {
        market: drift.market.clone(),
        date: date.to_string(),
        symbols,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(entries: &[(&str, &[&str])]) -> SymbolsByDate {
        entries
            .iter()
            .map(|(date, symbols)| {
                (
                    (*date).to_string(),
                    symbols.iter().map(|symbol| (*symbol).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn missing_is_remote_minus_local() {
        let remote = coverage(&[("20230101", &["A", "B"])]);
        let local = coverage(&[("20230101", &["A"])]);

        let (missing, extra) = diff_by_date(&remote, &local);

        assert_eq!(missing, coverage(&[("20230101", &["B"])]));
        assert!(extra.is_empty());
    }

    #[test]
    fn swapping_sides_swaps_the_result() {
        let remote = coverage(&[("20230101", &["A", "B"])]);
        let local = coverage(&[("20230101", &["A"])]);

        let (missing, extra) = diff_by_date(&local, &remote);

        assert!(missing.is_empty());
        assert_eq!(extra, coverage(&[("20230101", &["B"])]));
    }

    #[test]
    fn one_sided_dates_are_reported_whole() {
        let remote = coverage(&[("20230103", &["A"]), ("20230104", &["A", "C"])]);
        let local = coverage(&[("20230104", &["A", "C"]), ("20230105", &["D"])]);

        let (missing, extra) = diff_by_date(&remote, &local);

        assert_eq!(missing, coverage(&[("20230103", &["A"])]));
        assert_eq!(extra, coverage(&[("20230105", &["D"])]));
    }

    #[test]
    fn empty_local_dates_do_not_show_up_as_extra() {
        let remote = coverage(&[("20230103", &["A"])]);
        let local = coverage(&[("20230103", &["A"]), ("20230104", &[])]);

        let (missing, extra) = diff_by_date(&remote, &local);

        assert!(missing.is_empty());
        assert!(extra.is_empty());
    }
}
