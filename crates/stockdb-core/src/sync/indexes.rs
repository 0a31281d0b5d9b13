//! Index master sync.

use std::collections::HashSet;

use serde::Serialize;
use stockdb_warehouse::{IndexRecord, Warehouse, WarehouseError};
use tracing::info;

use crate::domain::{local_stock_code, RemoteSymbol, TradeDate};
use crate::error::SyncError;
use crate::lookup::{LookupCache, LookupKind};
use crate::remote::{IndexBasicRequest, IndexBasicRow};
use crate::sync::{new_run_id, non_blank, timestamp_now, RunLog, SkippedRow, SyncEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSyncOptions {
    /// Provider publisher market (`SSE`, `SZSE`, `CSI`, ...); `None` lists all.
    pub market: Option<String>,
    pub clear_lookups: bool,
}

impl Default for IndexSyncOptions {
    fn default() -> Self {
        Self {
            market: None,
            clear_lookups: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSyncReport {
    pub run_id: String,
    pub market: Option<String>,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
    pub cancelled: bool,
}

impl SyncEngine {
    /// Pull the index listing and upsert it by code.
    ///
    /// Indexes whose market maps to a local market get a local code; others
    /// keep the provider symbol as their code.
    pub async fn sync_indexes(
        &mut self,
        options: &IndexSyncOptions,
    ) -> Result<IndexSyncReport, SyncError> {
        let started_at = timestamp_now();
        let mut report = IndexSyncReport {
            run_id: new_run_id(),
            market: options.market.clone(),
            ..IndexSyncReport::default()
        };

        if options.clear_lookups {
            self.lookups.invalidate(&[LookupKind::Markets]);
        }

        let request = IndexBasicRequest {
            market: options.market.clone(),
        };
        let rows = match self.client.call(&request).await {
            Ok(rows) => rows,
            Err(error) if error.is_cancelled() => {
                info!(run_id = %report.run_id, "index sync cancelled during fetch");
                report.cancelled = true;
                Vec::new()
            }
            Err(error) => return Err(error.into()),
        };
        info!(market = ?options.market, rows = rows.len(), "fetched index listing");

        let existing: HashSet<String> = self.warehouse.index_codes()?.into_iter().collect();
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for row in &rows {
            let record = match translate_index(&mut self.lookups, &self.warehouse, row)? {
                Ok(record) => record,
                Err(skipped) => {
                    report.skipped.push(skipped);
                    continue;
                }
            };
            if !seen.insert(record.code.clone()) {
                report.skipped.push(SkippedRow {
                    remote_code: Some(record.remote_code),
                    name: Some(record.name),
                    reason: String::from("duplicate code in listing"),
                });
                continue;
            }
            if existing.contains(&record.code) {
                report.updated += 1;
            } else {
                report.created += 1;
            }
            records.push(record);
        }

        for batch in records.chunks(self.config.batch_size) {
            self.warehouse.upsert_indexes(batch)?;
        }
        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped.len(),
            "index listing written"
        );

        self.record_run(RunLog {
            run_id: &report.run_id,
            job: "indexes",
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

fn translate_index(
    lookups: &mut LookupCache,
    warehouse: &Warehouse,
    row: &IndexBasicRow,
) -> Result<Result<IndexRecord, SkippedRow>, WarehouseError> {
    let remote_code = non_blank(row.ts_code.as_deref());
    let name = non_blank(row.name.as_deref());
    let (Some(remote), Some(index_name)) = (remote_code.clone(), name.clone()) else {
        return Ok(Err(SkippedRow {
            remote_code,
            name,
            reason: String::from("missing symbol or name"),
        }));
    };

    let symbol = RemoteSymbol::parse(&remote).ok();
    let native = symbol
        .as_ref()
        .map_or_else(|| remote.clone(), |symbol| symbol.native().to_string());
    let acronym = non_blank(row.market.as_deref()).or_else(|| {
        symbol
            .as_ref()
            .and_then(|symbol| symbol.acronym().ok())
            .map(str::to_string)
    });
    let market = match acronym {
        Some(acronym) => lookups.market_code(warehouse, &acronym)?,
        None => None,
    };
    let code = market
        .as_deref()
        .map_or_else(|| remote.clone(), |market| local_stock_code(market, &native));

    Ok(Ok(IndexRecord {
        code,
        native_code: native,
        remote_code: remote,
        name: index_name,
        market,
        publisher: non_blank(row.publisher.as_deref()),
        category: non_blank(row.category.as_deref()),
        base_date: TradeDate::parse_optional(row.base_date.as_deref()).map(TradeDate::iso),
        listed_on: TradeDate::parse_optional(row.list_date.as_deref()).map(TradeDate::iso),
    }))
}
