use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Period code of daily bars.
pub const DAILY_PERIOD: &str = "DAILY";

/// Listing lifecycle of an instrument.
///
/// The provider partitions its instrument listing by this status, so it is
/// also the unit of paging for the instrument synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStatus {
    Delisted,
    Listed,
    Suspended,
}

impl ListStatus {
    /// Partition order used by the instrument synchronizer.
    pub const ALL: [Self; 3] = [Self::Delisted, Self::Listed, Self::Suspended];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delisted => "delisted",
            Self::Listed => "listed",
            Self::Suspended => "suspended",
        }
    }

    /// Single-letter code used by the provider.
    pub const fn remote_code(self) -> &'static str {
        match self {
            Self::Delisted => "D",
            Self::Listed => "L",
            Self::Suspended => "P",
        }
    }

    /// Suspended instruments remain listed.
    pub const fn is_listed(self) -> bool {
        matches!(self, Self::Listed | Self::Suspended)
    }
}

impl Display for ListStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListStatus {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "D" | "DELISTED" => Ok(Self::Delisted),
            "L" | "LISTED" => Ok(Self::Listed),
            "P" | "SUSPENDED" => Ok(Self::Suspended),
            _ => Err(ValidationError::InvalidListStatus {
                value: value.to_owned(),
            }),
        }
    }
}

/// Provider exchange suffixes and the market acronym each one stands for.
const EXCHANGE_SUFFIXES: [(&str, &str); 3] = [("SH", "SSE"), ("SZ", "SZSE"), ("BJ", "BSE")];

/// Market acronym for a provider exchange suffix (`SH` -> `SSE`).
pub fn exchange_acronym(suffix: &str) -> Option<&'static str> {
    EXCHANGE_SUFFIXES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(suffix))
        .map(|(_, acronym)| *acronym)
}

/// A provider symbol such as `600000.SH`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteSymbol {
    native: String,
    suffix: String,
}

impl RemoteSymbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidRemoteSymbol {
            value: input.to_owned(),
        };

        let (native, suffix) = trimmed.rsplit_once('.').ok_or_else(invalid)?;
        if native.is_empty() || suffix.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            native: native.to_owned(),
            suffix: suffix.to_ascii_uppercase(),
        })
    }

    /// Ticker without the exchange suffix.
    pub fn native(&self) -> &str {
        &self.native
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Market acronym implied by the suffix.
    pub fn acronym(&self) -> Result<&'static str, ValidationError> {
        exchange_acronym(&self.suffix).ok_or_else(|| ValidationError::UnknownExchangeSuffix {
            value: self.suffix.clone(),
        })
    }
}

impl Display for RemoteSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.native, self.suffix)
    }
}

/// Local instrument code: the local market code followed by the native ticker.
pub fn local_stock_code(market_code: &str, native: &str) -> String {
    format!("{market_code}{native}")
}
