use thiserror::Error;

use stockdb_warehouse::WarehouseError;

use crate::remote::RemoteError;

/// Validation errors for domain values entering the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("date must be YYYYMMDD or YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("unknown listing status '{value}', expected one of D, L, P")]
    InvalidListStatus { value: String },

    #[error("provider symbol must look like CODE.SUFFIX: '{value}'")]
    InvalidRemoteSymbol { value: String },

    #[error("unknown exchange suffix '{value}', expected one of SH, SZ, BJ")]
    UnknownExchangeSuffix { value: String },

    #[error("unknown market '{value}'")]
    UnknownMarket { value: String },

    #[error("date range start {start} is after end {end}")]
    InvertedDateRange { start: String, end: String },

    #[error("field '{field}' must be greater than zero")]
    NotPositive { field: &'static str },
}

/// Top-level error type for synchronizer runs.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// A provider call was abandoned because the job was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Remote(error) if error.is_cancelled())
    }
}
