use stockdb_core::{RemoteError, RemoteErrorKind, SyncError, ValidationError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SyncError> for CliError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Validation(error) => Self::Validation(error),
            SyncError::Remote(error) => Self::Remote(error),
            SyncError::Warehouse(error) => Self::Warehouse(error),
            SyncError::Serialization(error) => Self::Serialization(error),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Remote(error) if error.kind() == RemoteErrorKind::MissingToken => 2,
            Self::Remote(_) => 6,
            Self::Warehouse(_) => 7,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_a_configuration_failure() {
        let error = CliError::from(SyncError::Remote(RemoteError::missing_token()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn remote_and_validation_errors_keep_their_codes() {
        assert_eq!(
            CliError::from(SyncError::Remote(RemoteError::transport("reset"))).exit_code(),
            6
        );
        assert_eq!(
            CliError::from(ValidationError::UnknownMarket {
                value: "XXXX".to_string()
            })
            .exit_code(),
            2
        );
    }
}
