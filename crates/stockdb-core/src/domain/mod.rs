//! # Domain Models
//!
//! Typed values that cross the boundary between the remote provider and the
//! warehouse.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TradeDate`] | Calendar date, `YYYYMMDD` on the wire and ISO in storage |
//! | [`ListStatus`] | Listing lifecycle (delisted, listed, suspended) |
//! | [`RemoteSymbol`] | Provider symbol split into native code and exchange suffix |

mod date;
mod models;

pub use date::{TradeDate, EXCHANGE_OFFSET};
pub use models::{exchange_acronym, local_stock_code, ListStatus, RemoteSymbol, DAILY_PERIOD};
