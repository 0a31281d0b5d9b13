//! Slow-changing reference data: currencies, regions, firms, markets,
//! subjects and periods.
//!
//! The synchronizers only translate against these tables; they never create
//! them. A fresh warehouse is bootstrapped from a JSON document (or the
//! built-in [`ReferenceData::china_a_shares`] set) before the first sync.

use serde::{Deserialize, Serialize};
use stockdb_warehouse::{
    CurrencyRecord, FirmRecord, MarketRecord, PeriodRecord, RegionRecord, SubjectRecord,
    Warehouse, WarehouseError,
};
use tracing::info;

use crate::domain::DAILY_PERIOD;
use crate::error::SyncError;
use crate::lookup::LookupKind;
use crate::sync::SyncEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceData {
    pub currencies: Vec<CurrencyRecord>,
    pub regions: Vec<RegionRecord>,
    pub firms: Vec<FirmRecord>,
    pub markets: Vec<MarketRecord>,
    pub subjects: Vec<SubjectRecord>,
    pub periods: Vec<PeriodRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceLoadReport {
    pub currencies: usize,
    pub regions: usize,
    pub firms: usize,
    pub markets: usize,
    pub subjects: usize,
    pub periods: usize,
}

impl ReferenceData {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// The three mainland exchanges, their boards and the daily period.
    pub fn china_a_shares() -> Self {
        let market = |code: &str, name: &str, acronym: &str, website: &str, opened: &str| {
            MarketRecord {
                code: code.to_string(),
                name: name.to_string(),
                acronym: Some(acronym.to_string()),
                region: Some("CN".to_string()),
                currency: Some("CNY".to_string()),
                website: Some(website.to_string()),
                opened_on: Some(opened.to_string()),
            }
        };
        let board = |code: &str, name: &str, market: &str| SubjectRecord {
            code: code.to_string(),
            name: name.to_string(),
            level: 1,
            market: market.to_string(),
            parent: None,
            opened_on: None,
        };

        Self {
            currencies: vec![CurrencyRecord {
                code: "CNY".to_string(),
                name: "人民币".to_string(),
            }],
            regions: vec![RegionRecord {
                code: "CN".to_string(),
                name: "中国".to_string(),
                level: Some(1),
                parent: None,
            }],
            firms: Vec::new(),
            markets: vec![
                market(
                    "XSHG",
                    "上海证券交易所",
                    "SSE",
                    "http://www.sse.com.cn",
                    "1990-12-19",
                ),
                market("XSHE", "深圳证券交易所", "SZSE", "http://www.szse.cn", "1991-07-03"),
                market("BJSE", "北京证券交易所", "BSE", "http://www.bse.cn", "2021-11-15"),
            ],
            subjects: vec![
                board("XSHG.MAIN", "主板", "XSHG"),
                board("XSHG.STAR", "科创板", "XSHG"),
                board("XSHG.CDR", "CDR", "XSHG"),
                board("XSHE.MAIN", "主板", "XSHE"),
                board("XSHE.CHINEXT", "创业板", "XSHE"),
                board("BJSE.MAIN", "北交所", "BJSE"),
            ],
            periods: vec![PeriodRecord {
                code: DAILY_PERIOD.to_string(),
                name: "日线".to_string(),
            }],
        }
    }

    /// Upsert every table in dependency order.
    pub fn load_into(&self, warehouse: &Warehouse) -> Result<ReferenceLoadReport, WarehouseError> {
        let report = ReferenceLoadReport {
            currencies: warehouse.upsert_currencies(&self.currencies)?,
            regions: warehouse.upsert_regions(&self.regions)?,
            firms: warehouse.upsert_firms(&self.firms)?,
            markets: warehouse.upsert_markets(&self.markets)?,
            subjects: warehouse.upsert_subjects(&self.subjects)?,
            periods: warehouse.upsert_periods(&self.periods)?,
        };
        info!(
            markets = report.markets,
            subjects = report.subjects,
            periods = report.periods,
            "reference data loaded"
        );
        Ok(report)
    }
}

impl SyncEngine {
    /// Load reference data and drop the market and subject lookups built
    /// from the previous contents.
    pub fn load_reference(
        &mut self,
        data: &ReferenceData,
    ) -> Result<ReferenceLoadReport, SyncError> {
        let report = data.load_into(&self.warehouse)?;
        self.lookups
            .invalidate(&[LookupKind::Markets, LookupKind::Subjects]);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdb_warehouse::WarehouseConfig;
    use tempfile::tempdir;

    #[test]
    fn builtin_set_maps_every_exchange_suffix() {
        let data = ReferenceData::china_a_shares();
        let acronyms: Vec<_> = data
            .markets
            .iter()
            .filter_map(|market| market.acronym.as_deref())
            .collect();

        for suffix in ["SH", "SZ", "BJ"] {
            let acronym = crate::domain::exchange_acronym(suffix).expect("known suffix");
            assert!(acronyms.contains(&acronym), "{acronym} missing");
        }
    }

    #[test]
    fn partial_documents_default_missing_tables() {
        let data = ReferenceData::from_json(r#"{"periods":[{"code":"WEEKLY","name":"Weekly"}]}"#)
            .expect("parse");

        assert!(data.markets.is_empty());
        assert_eq!(data.periods.len(), 1);
    }

    #[test]
    fn loading_twice_keeps_one_row_per_code() {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig::at(temp.path())).expect("open");
        let data = ReferenceData::china_a_shares();

        data.load_into(&warehouse).expect("first load");
        let report = data.load_into(&warehouse).expect("second load");

        assert_eq!(report.markets, 3);
        assert_eq!(warehouse.list_markets().expect("markets").len(), 3);
        assert_eq!(warehouse.list_subjects().expect("subjects").len(), 6);
    }
}
