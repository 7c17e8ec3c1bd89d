//! In-memory implementations of the storage seams.
//!
//! Used by tests across the workspace and by single-process dry runs. The
//! semantics mirror the Postgres repositories, including the unique
//! constraints on candles and open order book levels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use market_relay_core::{normalize_symbol, BookSide, LevelStatus};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::documents::DocumentStore;
use crate::models::{
    CandleRecord, ErrorLogRecord, ExchangeRecord, OrderBookLevelRecord, PriceTickRecord,
    SignalIntervalRecord, SignalRecord, SymbolRecord,
};
use crate::store::{
    CandleStore, ErrorLogStore, HistoricalCandles, OrderBookStore, ReferenceData, SignalStore,
    TradeStore,
};

#[derive(Default)]
struct Tables {
    exchanges: Vec<ExchangeRecord>,
    symbols: Vec<SymbolRecord>,
    intervals: Vec<SignalIntervalRecord>,
    candles: Vec<CandleRecord>,
    levels: Vec<OrderBookLevelRecord>,
    ticks: Vec<PriceTickRecord>,
    signals: Vec<SignalRecord>,
    error_logs: Vec<ErrorLogRecord>,
}

/// Relational store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_prices: Mutex<HashSet<String>>,
    close_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_exchange(&self, exchange: ExchangeRecord) {
        self.tables.lock().exchanges.push(exchange);
    }

    pub fn add_symbol(&self, symbol: SymbolRecord) {
        self.tables.lock().symbols.push(symbol);
    }

    pub fn add_interval(&self, interval: SignalIntervalRecord) {
        self.tables.lock().intervals.push(interval);
    }

    /// Makes every close/upsert touching `price` fail, to exercise per-level isolation.
    pub fn fail_on_price(&self, price: impl Into<String>) {
        self.failing_prices.lock().insert(price.into());
    }

    #[must_use]
    pub fn candles(&self) -> Vec<CandleRecord> {
        self.tables.lock().candles.clone()
    }

    #[must_use]
    pub fn levels(&self) -> Vec<OrderBookLevelRecord> {
        self.tables.lock().levels.clone()
    }

    #[must_use]
    pub fn open_levels(&self, symbol: &str, side: BookSide) -> Vec<OrderBookLevelRecord> {
        self.tables
            .lock()
            .levels
            .iter()
            .filter(|l| l.symbol == symbol && l.side == side.as_str() && l.is_open())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn price_ticks(&self) -> Vec<PriceTickRecord> {
        self.tables.lock().ticks.clone()
    }

    #[must_use]
    pub fn signals(&self) -> Vec<SignalRecord> {
        self.tables.lock().signals.clone()
    }

    #[must_use]
    pub fn error_logs(&self) -> Vec<ErrorLogRecord> {
        self.tables.lock().error_logs.clone()
    }

    /// Number of close calls that changed a row.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn check_price(&self, price: &str) -> Result<()> {
        if self.failing_prices.lock().contains(price) {
            return Err(anyhow!("injected failure for price {price}"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReferenceData for MemoryStore {
    async fn active_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        Ok(self
            .tables
            .lock()
            .exchanges
            .iter()
            .filter(|e| e.is_live())
            .cloned()
            .collect())
    }

    async fn exchange(&self, id: Uuid) -> Result<Option<ExchangeRecord>> {
        Ok(self.tables.lock().exchanges.iter().find(|e| e.id == id).cloned())
    }

    async fn symbols_by_exchange(&self, exchange_id: Uuid) -> Result<Vec<SymbolRecord>> {
        Ok(self
            .tables
            .lock()
            .symbols
            .iter()
            .filter(|s| s.exchange_id == exchange_id && s.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn active_intervals(
        &self,
        exchange_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<SignalIntervalRecord>> {
        let symbol = normalize_symbol(symbol);
        Ok(self
            .tables
            .lock()
            .intervals
            .iter()
            .filter(|i| i.exchange_id == exchange_id && i.symbol == symbol && i.is_live())
            .cloned()
            .collect())
    }

    async fn find_interval(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<SignalIntervalRecord>> {
        let symbol = normalize_symbol(symbol);
        Ok(self
            .tables
            .lock()
            .intervals
            .iter()
            .find(|i| i.symbol == symbol && i.interval == interval && i.is_live())
            .cloned())
    }

    async fn find_symbol(&self, symbol: &str) -> Result<Option<SymbolRecord>> {
        let symbol = normalize_symbol(symbol);
        let tables = self.tables.lock();
        let mut matches: Vec<&SymbolRecord> =
            tables.symbols.iter().filter(|s| s.symbol == symbol).collect();
        matches.sort_by_key(|s| (s.deleted_at.is_some(), !s.is_active));
        Ok(matches.first().map(|s| (*s).clone()))
    }
}

#[async_trait]
impl CandleStore for MemoryStore {
    async fn candle_exists(&self, symbol: &str, interval: &str, open_time: i64) -> Result<bool> {
        Ok(self.tables.lock().candles.iter().any(|c| {
            c.symbol == symbol && c.interval == interval && c.open_time == open_time
        }))
    }

    async fn insert_candle(&self, candle: &CandleRecord) -> Result<bool> {
        let mut tables = self.tables.lock();
        let duplicate = tables.candles.iter().any(|c| {
            c.symbol == candle.symbol
                && c.interval == candle.interval
                && c.open_time == candle.open_time
        });
        if duplicate {
            return Ok(false);
        }
        tables.candles.push(candle.clone());
        Ok(true)
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>> {
        let mut candles: Vec<CandleRecord> = self
            .tables
            .lock()
            .candles
            .iter()
            .filter(|c| c.symbol == symbol && c.interval == interval)
            .cloned()
            .collect();
        candles.sort_by(|a, b| b.open_time.cmp(&a.open_time));
        candles.truncate(limit as usize);
        Ok(candles)
    }
}

#[async_trait]
impl OrderBookStore for MemoryStore {
    async fn close_level(&self, symbol: &str, side: BookSide, price: &str) -> Result<u64> {
        self.check_price(price)?;
        let mut changed = 0;
        for level in self.tables.lock().levels.iter_mut() {
            if level.symbol == symbol
                && level.side == side.as_str()
                && level.price == price
                && level.is_open()
            {
                level.status = LevelStatus::Closed.as_str().to_string();
                changed += 1;
            }
        }
        if changed > 0 {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(changed)
    }

    async fn upsert_level(&self, level: &OrderBookLevelRecord) -> Result<()> {
        self.check_price(&level.price)?;
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock();
        let existing = tables.levels.iter_mut().find(|l| {
            l.symbol == level.symbol && l.side == level.side && l.price == level.price && l.is_open()
        });
        match existing {
            Some(row) => row.amount.clone_from(&level.amount),
            None => {
                let mut row = level.clone();
                row.status = LevelStatus::Open.as_str().to_string();
                tables.levels.push(row);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_price_tick(&self, tick: &PriceTickRecord) -> Result<()> {
        self.tables.lock().ticks.push(tick.clone());
        Ok(())
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn append_signal(&self, signal: &SignalRecord) -> Result<()> {
        self.tables.lock().signals.push(signal.clone());
        Ok(())
    }
}

#[async_trait]
impl ErrorLogStore for MemoryStore {
    async fn append_error_log(&self, entry: &ErrorLogRecord) -> Result<()> {
        self.tables.lock().error_logs.push(entry.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub key: Option<String>,
    pub body: JsonValue,
}

/// Document store held in process memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<StoredDocument>>>,
    fail_inserts: Mutex<bool>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent insert fail.
    pub fn fail_inserts(&self) {
        *self.fail_inserts.lock() = true;
    }

    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn keyed(&self, collection: &str, key: &str) -> Option<JsonValue> {
        self.collections.lock().get(collection).and_then(|docs| {
            docs.iter()
                .find(|d| d.key.as_deref() == Some(key))
                .map(|d| d.body.clone())
        })
    }
}

fn merge(target: &mut JsonValue, fields: &JsonValue) {
    match (target.as_object_mut(), fields.as_object()) {
        (Some(target), Some(fields)) => {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        _ => *target = fields.clone(),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, document: &JsonValue) -> Result<String> {
        if *self.fail_inserts.lock() {
            return Err(anyhow!("document insert rejected"));
        }
        let id = Uuid::new_v4().to_string();
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                key: None,
                body: document.clone(),
            });
        Ok(id)
    }

    async fn upsert(&self, collection: &str, key: &str, document: &JsonValue) -> Result<()> {
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.key.as_deref() == Some(key)) {
            Some(existing) => merge(&mut existing.body, document),
            None => docs.push(StoredDocument {
                id: Uuid::new_v4().to_string(),
                key: Some(key.to_string()),
                body: document.clone(),
            }),
        }
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &JsonValue) -> Result<u64> {
        let mut collections = self.collections.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut changed = 0;
        for doc in docs.iter_mut().filter(|d| d.key.as_deref() == Some(key)) {
            merge(&mut doc.body, fields);
            changed += 1;
        }
        Ok(changed)
    }
}

/// Historical endpoint stand-in that serves a fixed candle set.
#[derive(Default)]
pub struct MemoryHistory {
    candles: Mutex<Vec<CandleRecord>>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MemoryHistory {
    #[must_use]
    pub fn with_candles(candles: Vec<CandleRecord>) -> Self {
        Self {
            candles: Mutex::new(candles),
            ..Self::default()
        }
    }

    /// Every fetch fails, as if the endpoint were exhausted.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoricalCandles for MemoryHistory {
    async fn fetch_candles(
        &self,
        _exchange: &ExchangeRecord,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(anyhow!("historical endpoint unavailable"));
        }
        let mut candles: Vec<CandleRecord> = self
            .candles
            .lock()
            .iter()
            .filter(|c| c.symbol == symbol && c.interval == interval)
            .cloned()
            .collect();
        candles.sort_by_key(|c| c.open_time);
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles.split_off(skip))
    }
}
