//! Shared fixtures for the behavior tests: a scripted provider and a seeded
//! warehouse.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use stockdb_core::remote::{
    DailyRequest, IndexBasicRequest, StockBasicRequest, TradeCalendarRequest,
};
use stockdb_core::{
    ProviderPolicy, ProviderTransport, ReferenceData, RemoteCall, RemoteClient, RemoteError,
    RemoteOperation, RemoteRequest, RemoteTable, RetryPolicy, SyncEngine, TradeDate, Warehouse,
    WarehouseConfig,
};
use tempfile::TempDir;

pub const TODAY: &str = "20230110";

/// A provider answering from in-memory tables.
///
/// Listings are keyed by list-status letter, bars by compact date. Queued
/// failures are returned, in order, before the operation answers normally.
#[derive(Default)]
pub struct ScriptedTransport {
    stocks: Mutex<HashMap<String, Vec<Vec<Value>>>>,
    indexes: Mutex<Vec<Vec<Value>>>,
    open_dates: Mutex<BTreeSet<String>>,
    bars: Mutex<BTreeMap<String, Vec<Vec<Value>>>>,
    failures: Mutex<HashMap<RemoteOperation, VecDeque<RemoteError>>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn list_stocks(&self, status: &str, rows: Vec<Vec<Value>>) {
        self.stocks
            .lock()
            .expect("stocks mutex poisoned")
            .insert(status.to_string(), rows);
    }

    pub fn list_indexes(&self, rows: Vec<Vec<Value>>) {
        *self.indexes.lock().expect("indexes mutex poisoned") = rows;
    }

    pub fn open_dates(&self, dates: &[&str]) {
        let mut open = self.open_dates.lock().expect("calendar mutex poisoned");
        open.extend(dates.iter().map(|date| (*date).to_string()));
    }

    /// Bars for `date`, one per `(symbol, close)`.
    pub fn trade(&self, date: &str, closes: &[(&str, f64)]) {
        let rows = closes
            .iter()
            .map(|(symbol, close)| bar_row(symbol, date, *close))
            .collect();
        self.trade_rows(date, rows);
    }

    /// Raw `daily` rows for `date`, for rows `bar_row` cannot express.
    pub fn trade_rows(&self, date: &str, rows: Vec<Vec<Value>>) {
        self.bars
            .lock()
            .expect("bars mutex poisoned")
            .insert(date.to_string(), rows);
    }

    pub fn fail_next(&self, operation: RemoteOperation, error: RemoteError) {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, operation: RemoteOperation) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls mutex poisoned").clear();
    }

    fn answer(&self, call: &RemoteCall) -> RemoteTable {
        match call.operation {
            RemoteOperation::StockBasic => {
                let status = call.param("list_status").unwrap_or("L");
                let exchange = call.param("exchange");
                let rows = self
                    .stocks
                    .lock()
                    .expect("stocks mutex poisoned")
                    .get(status)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|row| exchange.is_none_or(|wanted| row[6] == json!(wanted)))
                    .collect();
                RemoteTable::new(StockBasicRequest::FIELDS, rows)
            }
            RemoteOperation::IndexBasic => RemoteTable::new(
                IndexBasicRequest::FIELDS,
                self.indexes.lock().expect("indexes mutex poisoned").clone(),
            ),
            RemoteOperation::TradeCalendar => {
                let start = call.param("start_date").unwrap_or("00000000");
                let end = call.param("end_date").unwrap_or("99999999");
                let exchange = call.param("exchange").unwrap_or("SSE");
                let rows = self
                    .open_dates
                    .lock()
                    .expect("calendar mutex poisoned")
                    .iter()
                    .filter(|date| date.as_str() >= start && date.as_str() <= end)
                    .map(|date| vec![json!(exchange), json!(date), json!(1), Value::Null])
                    .collect();
                RemoteTable::new(TradeCalendarRequest::FIELDS, rows)
            }
            RemoteOperation::Daily => {
                let date = call.param("trade_date").unwrap_or_default();
                let wanted: Option<BTreeSet<&str>> =
                    call.param("ts_code").map(|codes| codes.split(',').collect());
                let rows = self
                    .bars
                    .lock()
                    .expect("bars mutex poisoned")
                    .get(date)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|row| {
                        wanted.as_ref().is_none_or(|codes| {
                            row[0].as_str().is_some_and(|symbol| codes.contains(&symbol))
                        })
                    })
                    .collect();
                RemoteTable::new(DailyRequest::FIELDS, rows)
            }
        }
    }
}

impl ProviderTransport for ScriptedTransport {
    fn fetch<'a>(
        &'a self,
        _token: &'a str,
        call: &'a RemoteCall,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteTable, RemoteError>> + Send + 'a>> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(call.clone());
        let failure = self
            .failures
            .lock()
            .expect("failures mutex poisoned")
            .get_mut(&call.operation)
            .and_then(VecDeque::pop_front);

        let result = match failure {
            Some(error) => Err(error),
            None => Ok(self.answer(call)),
        };
        Box::pin(async move { result })
    }
}

/// A provider listing row in `stock_basic` field order.
pub fn stock_row(ts_code: &str, name: &str, segment: &str, status: &str) -> Vec<Value> {
    let (symbol, suffix) = ts_code.split_once('.').unwrap_or((ts_code, ""));
    let exchange = match suffix {
        "SH" => "SSE",
        "SZ" => "SZSE",
        "BJ" => "BSE",
        _ => "",
    };
    vec![
        json!(ts_code),
        json!(symbol),
        json!(name),
        json!("上海"),
        json!("银行"),
        json!(segment),
        json!(exchange),
        json!(status),
        json!("19991110"),
        Value::Null,
    ]
}

pub fn bar_row(ts_code: &str, date: &str, close: f64) -> Vec<Value> {
    vec![
        json!(ts_code),
        json!(date),
        json!(close - 0.1),
        json!(close + 0.2),
        json!(close - 0.3),
        json!(close),
        json!(close - 0.05),
        json!(0.05),
        json!(0.5),
        json!(1_000.0),
        json!(10_000.0),
    ]
}

/// Generous quota and no retries unless a test asks for them.
pub fn policy() -> ProviderPolicy {
    ProviderPolicy::tushare_default()
        .with_quota(10_000, Duration::from_secs(60))
        .with_retry(RetryPolicy::no_retry())
}

pub fn open_warehouse(temp: &TempDir) -> Warehouse {
    Warehouse::open(WarehouseConfig::at(temp.path())).expect("warehouse open")
}

/// An engine over a warehouse seeded with the built-in reference set.
pub fn engine(temp: &TempDir, transport: &Arc<ScriptedTransport>) -> SyncEngine {
    engine_with_policy(temp, transport, &policy())
}

pub fn engine_with_policy(
    temp: &TempDir,
    transport: &Arc<ScriptedTransport>,
    policy: &ProviderPolicy,
) -> SyncEngine {
    let warehouse = open_warehouse(temp);
    ReferenceData::china_a_shares()
        .load_into(&warehouse)
        .expect("reference load");

    let client = RemoteClient::new(transport.clone(), policy).with_token("test-token");
    SyncEngine::new(warehouse, client).with_today(date(TODAY))
}

pub fn date(value: &str) -> TradeDate {
    TradeDate::parse(value).expect("valid date")
}

/// Two Shanghai stocks and one Shenzhen stock, all listed.
pub fn seed_listing(transport: &ScriptedTransport) {
    transport.list_stocks(
        "L",
        vec![
            stock_row("600000.SH", "浦发银行", "主板", "L"),
            stock_row("600036.SH", "招商银行", "主板", "L"),
            stock_row("000001.SZ", "平安银行", "主板", "L"),
        ],
    );
}
