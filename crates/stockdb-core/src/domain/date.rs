use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::macros::{format_description, offset};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::ValidationError;

const COMPACT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");
const ISO: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Local time of the exchanges whose calendar the provider serves (CST).
pub const EXCHANGE_OFFSET: UtcOffset = offset!(+8);

/// A trading calendar date.
///
/// The provider speaks `YYYYMMDD`; the warehouse stores ISO `YYYY-MM-DD`.
/// Both forms are accepted when parsing. `Display` and serde use the compact form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeDate(Date);

impl TradeDate {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let format = if trimmed.len() == 8 { COMPACT } else { ISO };
        Date::parse(trimmed, format)
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: input.to_owned(),
            })
    }

    /// Parse an optional provider field, treating empty strings as absent.
    pub fn parse_optional(input: Option<&str>) -> Option<Self> {
        input
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| Self::parse(value).ok())
    }

    pub const fn from_date(date: Date) -> Self {
        Self(date)
    }

    /// Today's date on the exchange clock.
    pub fn today() -> Self {
        Self::on_exchange_clock(OffsetDateTime::now_utc())
    }

    /// The exchange-local date of `instant`.
    pub fn on_exchange_clock(instant: OffsetDateTime) -> Self {
        Self(instant.to_offset(EXCHANGE_OFFSET).date())
    }

    pub fn next_day(self) -> Self {
        Self(self.0.next_day().unwrap_or(self.0))
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    /// `YYYYMMDD`
    pub fn compact(self) -> String {
        format!(
            "{:04}{:02}{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }

    /// `YYYY-MM-DD`
    pub fn iso(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl Display for TradeDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.compact())
    }
}

impl FromStr for TradeDate {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for TradeDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.compact())
    }
}

impl<'de> Deserialize<'de> for TradeDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
