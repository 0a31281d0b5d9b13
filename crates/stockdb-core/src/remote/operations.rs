//! Typed requests and rows for each provider operation.

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::domain::{ListStatus, TradeDate};
use crate::remote::RemoteOperation;

/// A request for one provider operation and the row type it yields.
pub trait RemoteRequest {
    const OPERATION: RemoteOperation;
    /// Columns requested from the provider.
    const FIELDS: &'static [&'static str];

    type Row: DeserializeOwned;

    fn params(&self) -> Map<String, Value>;
}

/// Instrument master listing, one status partition at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockBasicRequest {
    /// Provider market acronym; `None` lists every exchange.
    pub exchange: Option<String>,
    pub list_status: ListStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StockBasicRow {
    #[serde(default)]
    pub ts_code: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// Board/segment name within the exchange.
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub list_status: Option<String>,
    #[serde(default)]
    pub list_date: Option<String>,
    #[serde(default)]
    pub delist_date: Option<String>,
}

impl RemoteRequest for StockBasicRequest {
    const OPERATION: RemoteOperation = RemoteOperation::StockBasic;
    const FIELDS: &'static [&'static str] = &[
        "ts_code",
        "symbol",
        "name",
        "area",
        "industry",
        "market",
        "exchange",
        "list_status",
        "list_date",
        "delist_date",
    ];

    type Row = StockBasicRow;

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(exchange) = &self.exchange {
            params.insert("exchange".into(), Value::from(exchange.as_str()));
        }
        params.insert(
            "list_status".into(),
            Value::from(self.list_status.remote_code()),
        );
        params
    }
}

/// Trading calendar for one exchange and date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCalendarRequest {
    pub exchange: String,
    pub start_date: TradeDate,
    pub end_date: TradeDate,
    pub open_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeCalendarRow {
    #[serde(default)]
    pub exchange: Option<String>,
    pub cal_date: String,
    #[serde(deserialize_with = "deserialize_flag")]
    pub is_open: bool,
    #[serde(default)]
    pub pretrade_date: Option<String>,
}

impl RemoteRequest for TradeCalendarRequest {
    const OPERATION: RemoteOperation = RemoteOperation::TradeCalendar;
    const FIELDS: &'static [&'static str] = &["exchange", "cal_date", "is_open", "pretrade_date"];

    type Row = TradeCalendarRow;

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("exchange".into(), Value::from(self.exchange.as_str()));
        params.insert("start_date".into(), Value::from(self.start_date.compact()));
        params.insert("end_date".into(), Value::from(self.end_date.compact()));
        if self.open_only {
            params.insert("is_open".into(), Value::from("1"));
        }
        params
    }
}

/// Daily bars for one date, optionally limited to a symbol subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRequest {
    pub trade_date: TradeDate,
    /// Provider symbols; empty means every symbol traded that day.
    pub ts_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyRow {
    pub ts_code: String,
    pub trade_date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub pre_close: Option<f64>,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub pct_chg: Option<f64>,
    #[serde(default)]
    pub vol: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl RemoteRequest for DailyRequest {
    const OPERATION: RemoteOperation = RemoteOperation::Daily;
    const FIELDS: &'static [&'static str] = &[
        "ts_code",
        "trade_date",
        "open",
        "high",
        "low",
        "close",
        "pre_close",
        "change",
        "pct_chg",
        "vol",
        "amount",
    ];

    type Row = DailyRow;

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("trade_date".into(), Value::from(self.trade_date.compact()));
        if !self.ts_codes.is_empty() {
            params.insert("ts_code".into(), Value::from(self.ts_codes.join(",")));
        }
        params
    }
}

/// Index master listing for one publisher market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBasicRequest {
    /// Publisher market (`SSE`, `SZSE`, `CSI`, ...); `None` lists all.
    pub market: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexBasicRow {
    #[serde(default)]
    pub ts_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub base_date: Option<String>,
    #[serde(default)]
    pub list_date: Option<String>,
}

impl RemoteRequest for IndexBasicRequest {
    const OPERATION: RemoteOperation = RemoteOperation::IndexBasic;
    const FIELDS: &'static [&'static str] = &[
        "ts_code",
        "name",
        "market",
        "publisher",
        "category",
        "base_date",
        "list_date",
    ];

    type Row = IndexBasicRow;

    fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(market) = &self.market {
            params.insert("market".into(), Value::from(market.as_str()));
        }
        params
    }
}

/// Accepts `1`/`0`, `"1"`/`"0"` and booleans.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => Ok(number.as_i64().unwrap_or_default() != 0),
        Value::String(text) => match text.trim() {
            "1" | "true" | "Y" => Ok(true),
            "0" | "false" | "N" | "" => Ok(false),
            other => Err(D::Error::custom(format!("invalid flag '{other}'"))),
        },
        Value::Null => Ok(false),
        other => Err(D::Error::custom(format!("invalid flag {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteTable;
    use serde_json::json;

    #[test]
    fn daily_request_joins_symbols() {
        let request = DailyRequest {
            trade_date: TradeDate::parse("20230103").expect("date"),
            ts_codes: vec!["600000.SH".to_string(), "000001.SZ".to_string()],
        };

        let params = request.params();
        assert_eq!(params["trade_date"], json!("20230103"));
        assert_eq!(params["ts_code"], json!("600000.SH,000001.SZ"));
    }

    #[test]
    fn stock_basic_request_sends_status_letter() {
        let request = StockBasicRequest {
            exchange: None,
            list_status: ListStatus::Suspended,
        };

        let params = request.params();
        assert_eq!(params.get("exchange"), None);
        assert_eq!(params["list_status"], json!("P"));
    }

    #[test]
    fn calendar_flag_accepts_numbers_and_strings() {
        let table = RemoteTable::new(
            TradeCalendarRequest::FIELDS,
            vec![
                vec![json!("SSE"), json!("20230102"), json!(0), json!("20221230")],
                vec![json!("SSE"), json!("20230103"), json!("1"), Value::Null],
            ],
        );

        let rows: Vec<TradeCalendarRow> = table.decode_rows().expect("decode");
        assert!(!rows[0].is_open);
        assert!(rows[1].is_open);
        assert_eq!(rows[1].pretrade_date, None);
    }
}
