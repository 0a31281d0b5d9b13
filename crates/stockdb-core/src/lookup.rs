//! Identifier translation tables built from the warehouse.
//!
//! Each table is built lazily on first use from a full scan of the rows it
//! indexes and then served from memory. Tables are only rebuilt after an
//! explicit [`LookupCache::invalidate`]; a row written in between stays
//! invisible until then. Every invalidation bumps the cache generation, and
//! each table remembers the generation it was built in.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use stockdb_warehouse::{Warehouse, WarehouseError};
use tracing::debug;

/// Named lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    /// Market code <-> provider acronym.
    Markets,
    /// (acronym, segment name) -> subject code.
    Subjects,
    /// Stock code <-> provider symbol, stock code -> market and primary key.
    Stocks,
    /// (period, market) -> dates with stored bars.
    PeriodDates,
}

impl LookupKind {
    pub const ALL: [Self; 4] = [
        Self::Markets,
        Self::Subjects,
        Self::Stocks,
        Self::PeriodDates,
    ];
}

#[derive(Debug)]
struct Built<T> {
    generation: u64,
    table: T,
}

#[derive(Debug, Default)]
struct MarketTable {
    code_by_acronym: HashMap<String, String>,
    acronym_by_code: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct SubjectEntry {
    name: String,
    level: i32,
    code: String,
}

#[derive(Debug, Default)]
struct SubjectTable {
    /// Subjects per market acronym, ordered by (level, code).
    by_acronym: HashMap<String, Vec<SubjectEntry>>,
}

#[derive(Debug, Default)]
struct StockTable {
    code_by_remote: HashMap<String, String>,
    remote_by_code: HashMap<String, String>,
    market_by_code: HashMap<String, String>,
    id_by_code: HashMap<String, i64>,
}

/// Process-local translation cache over warehouse rows.
#[derive(Debug, Default)]
pub struct LookupCache {
    generation: u64,
    markets: Option<Built<MarketTable>>,
    subjects: Option<Built<SubjectTable>>,
    stocks: Option<Built<StockTable>>,
    period_dates: HashMap<(String, String), Built<BTreeSet<String>>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation the table was built in, `None` while unbuilt.
    pub fn built_generation(&self, kind: LookupKind) -> Option<u64> {
        match kind {
            LookupKind::Markets => self.markets.as_ref().map(|built| built.generation),
            LookupKind::Subjects => self.subjects.as_ref().map(|built| built.generation),
            LookupKind::Stocks => self.stocks.as_ref().map(|built| built.generation),
            LookupKind::PeriodDates => self
                .period_dates
                .values()
                .map(|built| built.generation)
                .max(),
        }
    }

    /// Drop the named tables so the next access rebuilds them from storage.
    pub fn invalidate(&mut self, kinds: &[LookupKind]) {
        if kinds.is_empty() {
            return;
        }

        self.generation += 1;
        for kind in kinds {
            match kind {
                LookupKind::Markets => self.markets = None,
                LookupKind::Subjects => self.subjects = None,
                LookupKind::Stocks => self.stocks = None,
                LookupKind::PeriodDates => self.period_dates.clear(),
            }
        }
        debug!(generation = self.generation, ?kinds, "lookup tables invalidated");
    }

    pub fn invalidate_all(&mut self) {
        self.invalidate(&LookupKind::ALL);
    }

    // -- markets ----------------------------------------------------------

    pub fn market_code(
        &mut self,
        warehouse: &Warehouse,
        acronym: &str,
    ) -> Result<Option<String>, WarehouseError> {
        Ok(self
            .markets(warehouse)?
            .code_by_acronym
            .get(acronym)
            .cloned())
    }

    pub fn market_acronym(
        &mut self,
        warehouse: &Warehouse,
        market_code: &str,
    ) -> Result<Option<String>, WarehouseError> {
        Ok(self
            .markets(warehouse)?
            .acronym_by_code
            .get(market_code)
            .cloned())
    }

    /// Every market with a provider acronym, as `(code, acronym)` sorted by code.
    pub fn mapped_markets(
        &mut self,
        warehouse: &Warehouse,
    ) -> Result<Vec<(String, String)>, WarehouseError> {
        let mut markets: Vec<_> = self
            .markets(warehouse)?
            .acronym_by_code
            .iter()
            .map(|(code, acronym)| (code.clone(), acronym.clone()))
            .collect();
        markets.sort();
        Ok(markets)
    }

    fn markets(&mut self, warehouse: &Warehouse) -> Result<&MarketTable, WarehouseError> {
        let built = match self.markets.take() {
            Some(built) => built,
            None => Built {
                generation: self.generation,
                table: build_market_table(warehouse)?,
            },
        };
        Ok(&self.markets.insert(built).table)
    }

    // -- subjects ---------------------------------------------------------

    /// Resolve a provider segment name within a market to a subject code.
    ///
    /// An exact name match wins; otherwise the shallowest subject whose name
    /// starts with the segment name is used. `None` when nothing matches.
    pub fn subject_code(
        &mut self,
        warehouse: &Warehouse,
        acronym: &str,
        segment: &str,
    ) -> Result<Option<String>, WarehouseError> {
        let segment = segment.trim();
        if segment.is_empty() {
            return Ok(None);
        }

        let subjects = self.subjects(warehouse)?;
        let Some(entries) = subjects.by_acronym.get(acronym) else {
            return Ok(None);
        };

        let exact = entries.iter().find(|entry| entry.name == segment);
        let prefixed = || entries.iter().find(|entry| entry.name.starts_with(segment));
        Ok(exact.or_else(prefixed).map(|entry| entry.code.clone()))
    }

    fn subjects(&mut self, warehouse: &Warehouse) -> Result<&SubjectTable, WarehouseError> {
        let built = match self.subjects.take() {
            Some(built) => built,
            None => Built {
                generation: self.generation,
                table: build_subject_table(warehouse)?,
            },
        };
        Ok(&self.subjects.insert(built).table)
    }

    // -- stocks -----------------------------------------------------------

    pub fn stock_code(
        &mut self,
        warehouse: &Warehouse,
        remote_code: &str,
    ) -> Result<Option<String>, WarehouseError> {
        Ok(self
            .stocks(warehouse)?
            .code_by_remote
            .get(remote_code)
            .cloned())
    }

    pub fn stock_remote_code(
        &mut self,
        warehouse: &Warehouse,
        code: &str,
    ) -> Result<Option<String>, WarehouseError> {
        Ok(self.stocks(warehouse)?.remote_by_code.get(code).cloned())
    }

    pub fn stock_market(
        &mut self,
        warehouse: &Warehouse,
        code: &str,
    ) -> Result<Option<String>, WarehouseError> {
        Ok(self.stocks(warehouse)?.market_by_code.get(code).cloned())
    }

    pub fn stock_id(
        &mut self,
        warehouse: &Warehouse,
        code: &str,
    ) -> Result<Option<i64>, WarehouseError> {
        Ok(self.stocks(warehouse)?.id_by_code.get(code).copied())
    }

    fn stocks(&mut self, warehouse: &Warehouse) -> Result<&StockTable, WarehouseError> {
        let built = match self.stocks.take() {
            Some(built) => built,
            None => Built {
                generation: self.generation,
                table: build_stock_table(warehouse)?,
            },
        };
        Ok(&self.stocks.insert(built).table)
    }

    // -- period dates -----------------------------------------------------

    /// Whether bars are stored for `(period, market)` on the ISO date.
    pub fn is_known_date(
        &mut self,
        warehouse: &Warehouse,
        period: &str,
        market: &str,
        iso_date: &str,
    ) -> Result<bool, WarehouseError> {
        let key = (period.to_string(), market.to_string());
        if !self.period_dates.contains_key(&key) {
            let dates: BTreeSet<String> =
                warehouse.period_dates(period, market)?.into_iter().collect();
            self.period_dates.insert(
                key.clone(),
                Built {
                    generation: self.generation,
                    table: dates,
                },
            );
        }

        Ok(self
            .period_dates
            .get(&key)
            .is_some_and(|built| built.table.contains(iso_date)))
    }
}

fn build_market_table(warehouse: &Warehouse) -> Result<MarketTable, WarehouseError> {
    let mut table = MarketTable::default();
    for market in warehouse.list_markets()? {
        let Some(acronym) = market.acronym.filter(|acronym| !acronym.is_empty()) else {
            continue;
        };
        table
            .code_by_acronym
            .insert(acronym.clone(), market.code.clone());
        table.acronym_by_code.insert(market.code, acronym);
    }
    debug!(entries = table.code_by_acronym.len(), "built market lookup");
    Ok(table)
}

fn build_subject_table(warehouse: &Warehouse) -> Result<SubjectTable, WarehouseError> {
    let acronyms: HashMap<String, String> = warehouse
        .list_markets()?
        .into_iter()
        .filter_map(|market| market.acronym.map(|acronym| (market.code, acronym)))
        .collect();

    let mut table = SubjectTable::default();
    for subject in warehouse.list_subjects()? {
        let Some(acronym) = acronyms.get(&subject.market) else {
            continue;
        };
        table
            .by_acronym
            .entry(acronym.clone())
            .or_default()
            .push(SubjectEntry {
                name: subject.name,
                level: subject.level,
                code: subject.code,
            });
    }
    for entries in table.by_acronym.values_mut() {
        entries.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.code.cmp(&b.code)));
    }
    Ok(table)
}

fn build_stock_table(warehouse: &Warehouse) -> Result<StockTable, WarehouseError> {
    let mut table = StockTable::default();
    for key in warehouse.list_stock_keys(None)? {
        table
            .code_by_remote
            .insert(key.remote_code.clone(), key.code.clone());
        table
            .remote_by_code
            .insert(key.code.clone(), key.remote_code);
        table.market_by_code.insert(key.code.clone(), key.market);
        table.id_by_code.insert(key.code, key.id);
    }
    debug!(entries = table.id_by_code.len(), "built stock lookup");
    Ok(table)
}
