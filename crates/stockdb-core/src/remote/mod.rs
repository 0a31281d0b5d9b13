//! Remote provider access.
//!
//! The provider is an RPC-style API: every call names an operation, carries
//! the access token and a parameter object, and answers with a table of
//! `fields` and `items`. Operations are a closed set ([`RemoteOperation`]),
//! each with a typed request and row shape in [`operations`].

pub mod client;
pub mod operations;
pub mod tushare;

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use client::RemoteClient;
pub use operations::{
    DailyRequest, DailyRow, IndexBasicRequest, IndexBasicRow, RemoteRequest, StockBasicRequest,
    StockBasicRow, TradeCalendarRequest, TradeCalendarRow,
};
pub use tushare::TushareTransport;

/// Supported provider operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOperation {
    StockBasic,
    TradeCalendar,
    Daily,
    IndexBasic,
}

impl RemoteOperation {
    pub const ALL: [Self; 4] = [
        Self::StockBasic,
        Self::TradeCalendar,
        Self::Daily,
        Self::IndexBasic,
    ];

    /// Operation name on the wire.
    pub const fn api_name(self) -> &'static str {
        match self {
            Self::StockBasic => "stock_basic",
            Self::TradeCalendar => "trade_cal",
            Self::Daily => "daily",
            Self::IndexBasic => "index_basic",
        }
    }
}

impl Display for RemoteOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Classification of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// No access token configured.
    MissingToken,
    /// Network or HTTP-level failure.
    Transport,
    /// The provider rejected the call for exceeding its rate.
    RateLimited,
    /// The provider answered with a non-zero result code.
    Provider,
    /// The payload did not match the expected shape.
    Decode,
    /// The job was cancelled while the call was pending.
    Cancelled,
}

/// Error returned by the remote client and transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    message: String,
    retryable: bool,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn missing_token() -> Self {
        Self::new(
            RemoteErrorKind::MissingToken,
            "provider access token is not configured",
            false,
        )
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimited, message, true)
    }

    pub fn provider(code: i64, message: impl Into<String>) -> Self {
        Self::new(
            RemoteErrorKind::Provider,
            format!("provider code {code}: {}", message.into()),
            true,
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Decode, message, false)
    }

    pub fn cancelled() -> Self {
        Self::new(
            RemoteErrorKind::Cancelled,
            "call abandoned after cancellation",
            false,
        )
    }

    pub const fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == RemoteErrorKind::Cancelled
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// One encoded provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub operation: RemoteOperation,
    pub params: Map<String, Value>,
    pub fields: &'static [&'static str],
}

impl RemoteCall {
    pub fn from_request<R: RemoteRequest>(request: &R) -> Self {
        Self {
            operation: R::OPERATION,
            params: request.params(),
            fields: R::FIELDS,
        }
    }

    /// String parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

/// Tabular provider payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteTable {
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub items: Vec<Vec<Value>>,
}

impl RemoteTable {
    pub fn new(fields: &[&str], items: Vec<Vec<Value>>) -> Self {
        Self {
            fields: fields.iter().map(|field| (*field).to_owned()).collect(),
            items,
        }
    }

    /// Decode every item into a typed row by zipping it with the field names.
    ///
    /// The first malformed row fails the whole table.
    pub fn decode_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>, RemoteError> {
        self.decode_each().into_iter().collect()
    }

    /// Decode each item on its own, keeping per-row failures in place.
    pub fn decode_each<T: DeserializeOwned>(&self) -> Vec<Result<T, RemoteError>> {
        (0..self.items.len())
            .map(|index| self.decode_row(index))
            .collect()
    }

    fn decode_row<T: DeserializeOwned>(&self, index: usize) -> Result<T, RemoteError> {
        let item = &self.items[index];
        if item.len() != self.fields.len() {
            return Err(RemoteError::decode(format!(
                "row {index} has {} values for {} fields",
                item.len(),
                self.fields.len()
            )));
        }

        let object: Map<String, Value> = self
            .fields
            .iter()
            .cloned()
            .zip(item.iter().cloned())
            .collect();
        serde_json::from_value(Value::Object(object))
            .map_err(|error| RemoteError::decode(format!("row {index}: {error}")))
    }

    /// Raw text of one cell, looked up by field name.
    pub fn text(&self, index: usize, field: &str) -> Option<&str> {
        let column = self.fields.iter().position(|name| name == field)?;
        self.items.get(index)?.get(column)?.as_str()
    }
}

/// Provider transport seam.
pub trait ProviderTransport: Send + Sync {
    fn fetch<'a>(
        &'a self,
        token: &'a str,
        call: &'a RemoteCall,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteTable, RemoteError>> + Send + 'a>>;
}
