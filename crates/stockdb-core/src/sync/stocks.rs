//! Instrument master sync.

use std::collections::HashSet;

use serde::Serialize;
use stockdb_warehouse::{StockRecord, Warehouse, WarehouseError};
use tracing::{debug, info};

use crate::domain::{local_stock_code, ListStatus, RemoteSymbol, TradeDate};
use crate::error::{SyncError, ValidationError};
use crate::lookup::{LookupCache, LookupKind};
use crate::remote::{StockBasicRequest, StockBasicRow};
use crate::sync::{new_run_id, non_blank, timestamp_now, RunLog, SyncEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockSyncOptions {
    /// Local market code; `None` syncs every exchange the provider lists.
    pub market: Option<String>,
    /// Rebuild market, subject and stock lookups before the run.
    pub clear_lookups: bool,
}

impl Default for StockSyncOptions {
    fn default() -> Self {
        Self {
            market: None,
            clear_lookups: true,
        }
    }
}

/// A provider row that was not written, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub remote_code: Option<String>,
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockSyncReport {
    pub run_id: String,
    pub market: Option<String>,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
    pub cancelled: bool,
}

enum Translated {
    Create(StockRecord),
    Update(i64, StockRecord),
    Skip(SkippedRow),
}

impl SyncEngine {
    /// Pull the full instrument listing and create or update local stocks.
    ///
    /// Partitions are fetched in delisted, listed, suspended order. A stock
    /// that appears in more than one partition is written by each, so the
    /// last partition's status wins. Fetch errors abort the run.
    pub async fn sync_stocks(
        &mut self,
        options: &StockSyncOptions,
    ) -> Result<StockSyncReport, SyncError> {
        let started_at = timestamp_now();
        let mut report = StockSyncReport {
            run_id: new_run_id(),
            market: options.market.clone(),
            ..StockSyncReport::default()
        };

        if options.clear_lookups {
            self.lookups.invalidate(&[
                LookupKind::Markets,
                LookupKind::Subjects,
                LookupKind::Stocks,
            ]);
        }

        let exchange = match options.market.as_deref() {
            Some(market) => Some(
                self.lookups
                    .market_acronym(&self.warehouse, market)?
                    .ok_or_else(|| ValidationError::UnknownMarket {
                        value: market.to_string(),
                    })?,
            ),
            None => None,
        };

        for status in ListStatus::ALL {
            if self.is_cancelled() {
                info!(run_id = %report.run_id, "stock sync cancelled");
                report.cancelled = true;
                break;
            }

            let request = StockBasicRequest {
                exchange: exchange.clone(),
                list_status: status,
            };
            let rows = match self.client.call(&request).await {
                Ok(rows) => rows,
                Err(error) if error.is_cancelled() => {
                    info!(run_id = %report.run_id, "stock sync cancelled during fetch");
                    report.cancelled = true;
                    break;
                }
                Err(error) => return Err(error.into()),
            };
            info!(status = %status, rows = rows.len(), "fetched stock listing");

            let mut creates = Vec::new();
            let mut updates = Vec::new();
            let mut seen = HashSet::new();
            for row in &rows {
                match translate_row(&mut self.lookups, &self.warehouse, row, status)? {
                    Translated::Create(record) | Translated::Update(_, record)
                        if !seen.insert(record.code.clone()) =>
                    {
                        report.skipped.push(SkippedRow {
                            remote_code: Some(record.remote_code),
                            name: Some(record.name),
                            reason: String::from("duplicate code in listing"),
                        });
                    }
                    Translated::Create(record) => creates.push(record),
                    Translated::Update(id, record) => updates.push((id, record)),
                    Translated::Skip(skipped) => report.skipped.push(skipped),
                }
            }

            let batch_size = self.config.batch_size;
            for batch in creates.chunks(batch_size) {
                report.created += self.warehouse.insert_stocks(batch)?;
            }
            for batch in updates.chunks(batch_size) {
                report.updated += self.warehouse.update_stocks(batch)?;
            }
            self.lookups.invalidate(&[LookupKind::Stocks]);

            info!(
                status = %status,
                created = creates.len(),
                updated = updates.len(),
                skipped = report.skipped.len(),
                "stock partition written"
            );
        }

        self.record_run(RunLog {
            run_id: &report.run_id,
            job: "stocks",
            market: report.market.as_deref(),
            created: report.created,
            updated: report.updated,
            skipped: report.skipped.len(),
            failed: 0,
            cancelled: report.cancelled,
            started_at: &started_at,
        });
        Ok(report)
    }
}

/// Map one provider row onto a local instrument.
///
/// Rows missing any identifying field are skipped, as are rows whose exchange
/// has no local market. An unknown board leaves the subject empty.
fn translate_row(
    lookups: &mut LookupCache,
    warehouse: &Warehouse,
    row: &StockBasicRow,
    partition: ListStatus,
) -> Result<Translated, WarehouseError> {
    let remote_code = non_blank(row.ts_code.as_deref());
    let native_code = non_blank(row.symbol.as_deref());
    let name = non_blank(row.name.as_deref());
    let skip = |reason: &str| {
        Translated::Skip(SkippedRow {
            remote_code: remote_code.clone(),
            name: name.clone(),
            reason: reason.to_string(),
        })
    };

    let (Some(remote), Some(native), Some(stock_name)) = (&remote_code, &native_code, &name) else {
        return Ok(skip("missing symbol or name"));
    };

    let acronym = match non_blank(row.exchange.as_deref()) {
        Some(exchange) => exchange,
        None => match RemoteSymbol::parse(remote).and_then(|symbol| symbol.acronym()) {
            Ok(acronym) => acronym.to_string(),
            Err(_) => return Ok(skip("missing market")),
        },
    };
    let Some(market) = lookups.market_code(warehouse, &acronym)? else {
        debug!(remote_code = %remote, acronym = %acronym, "no local market for exchange");
        return Ok(skip("unmapped market"));
    };

    let subject = match row.market.as_deref() {
        Some(segment) => lookups.subject_code(warehouse, &acronym, segment)?,
        None => None,
    };
    let status = row
        .list_status
        .as_deref()
        .and_then(|value| value.parse::<ListStatus>().ok())
        .unwrap_or(partition);

    let code = local_stock_code(&market, native);
    let record = StockRecord {
        code: code.clone(),
        native_code: native.clone(),
        remote_code: remote.clone(),
        isin: None,
        name: stock_name.clone(),
        market,
        subject,
        firm: None,
        status: status.as_str().to_string(),
        is_listed: status.is_listed(),
        listed_on: iso_date(row.list_date.as_deref()),
        delisted_on: iso_date(row.delist_date.as_deref()),
    };

    Ok(match lookups.stock_id(warehouse, &code)? {
        Some(id) => Translated::Update(id, record),
        None => Translated::Create(record),
    })
}

fn iso_date(value: Option<&str>) -> Option<String> {
    TradeDate::parse_optional(value).map(TradeDate::iso)
}
