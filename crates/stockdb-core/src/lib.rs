//! # Stockdb Core
//!
//! Synchronization and reconciliation of market reference data against a
//! remote financial-data provider.
//!
//! ## Overview
//!
//! This crate keeps a local [`Warehouse`] in step with the provider:
//!
//! - **Lookup cache** translating provider symbols and acronyms to local codes
//! - **Rate-limited remote client** with a rolling call window and retry policy
//! - **Entity synchronizers** for the instrument and index master lists
//! - **Time-series synchronizer** for daily bars
//! - **Reconciliation engine** comparing provider and local coverage per date
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Trade dates, listing status, provider symbols |
//! | [`error`] | Validation and sync error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`lookup`] | Identifier translation cache |
//! | [`provider_policy`] | Endpoint, quota and retry settings |
//! | [`remote`] | Provider operations, transport and client |
//! | [`retry`] | Retry policy and backoff |
//! | [`sync`] | Synchronizers and reconciliation |
//! | [`throttling`] | Rolling call window |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockdb_core::{
//!     DailySyncOptions, ProviderPolicy, RemoteClient, SyncEngine, TushareTransport, Warehouse,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let policy = ProviderPolicy::from_env();
//!     let transport = Arc::new(TushareTransport::from_policy(&policy));
//!     let client = RemoteClient::new(transport, &policy).with_token("your-token");
//!
//!     let mut engine = SyncEngine::new(Warehouse::open_default()?, client);
//!     let report = engine.sync_daily(&DailySyncOptions::default()).await?;
//!     println!("created {} bars", report.created);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / caller   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   SyncEngine    │────▶│   LookupCache    │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  RemoteClient   │     │    Warehouse     │
//! │ (window, retry) │     │    (DuckDB)      │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ProviderTransport│────▶│   HttpClient     │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Remote failures carry a kind that decides whether they are retried:
//!
//! ```rust
//! use stockdb_core::{RemoteError, RemoteErrorKind};
//!
//! fn describe(error: &RemoteError) -> &'static str {
//!     match error.kind() {
//!         RemoteErrorKind::MissingToken => "configure a provider token",
//!         RemoteErrorKind::RateLimited => "waited out the call window",
//!         RemoteErrorKind::Decode => "provider payload changed shape",
//!         _ => "transient provider failure",
//!     }
//! }
//! ```

pub mod domain;
pub mod error;
pub mod http_client;
pub mod lookup;
pub mod provider_policy;
pub mod remote;
pub mod retry;
pub mod sync;
pub mod throttling;

// Domain models
pub use domain::{
    exchange_acronym, local_stock_code, ListStatus, RemoteSymbol, TradeDate, DAILY_PERIOD,
    EXCHANGE_OFFSET,
};

// Error types
pub use error::{SyncError, ValidationError};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Lookup cache
pub use lookup::{LookupCache, LookupKind};

// Provider policy and retry
pub use provider_policy::{ProviderPolicy, DEFAULT_TUSHARE_ENDPOINT};
pub use retry::{Backoff, RetryPolicy};

// Remote access
pub use remote::{
    ProviderTransport, RemoteCall, RemoteClient, RemoteError, RemoteErrorKind, RemoteOperation,
    RemoteRequest, RemoteTable, TushareTransport,
};

// Synchronizers
pub use sync::{
    diff_by_date, CancelFlag, ChecksumOptions, ChecksumReport, DailySyncOptions, DailySyncReport,
    IndexSyncOptions, IndexSyncReport, MarketDrift, ReferenceData, ReferenceLoadReport,
    RepairFailure, SkippedBar, SkippedRow, StockSyncOptions, StockSyncReport, SymbolsByDate,
    SyncConfig, SyncEngine,
};

// Throttling
pub use throttling::CallWindow;

// Warehouse (re-exported from stockdb-warehouse)
pub use stockdb_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
