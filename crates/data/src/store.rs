//! Storage seams used by the relay components.
//!
//! Each trait is implemented by a Postgres repository for deployment and by
//! [`crate::memory::MemoryStore`] for tests and single-process runs.

use anyhow::Result;
use async_trait::async_trait;
use market_relay_core::BookSide;
use uuid::Uuid;

use crate::models::{
    CandleRecord, ErrorLogRecord, ExchangeRecord, OrderBookLevelRecord, PriceTickRecord,
    SignalIntervalRecord, SignalRecord, SymbolRecord,
};

/// Read access to exchanges, symbols and signal intervals.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    /// Exchanges that are active and not soft-deleted.
    async fn active_exchanges(&self) -> Result<Vec<ExchangeRecord>>;

    async fn exchange(&self, id: Uuid) -> Result<Option<ExchangeRecord>>;

    /// Symbols owned by an exchange, excluding soft-deleted rows.
    async fn symbols_by_exchange(&self, exchange_id: Uuid) -> Result<Vec<SymbolRecord>>;

    /// Active intervals configured for a symbol on an exchange.
    async fn active_intervals(
        &self,
        exchange_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<SignalIntervalRecord>>;

    /// Looks up the active interval row for a (symbol, interval) pair on any exchange.
    async fn find_interval(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<SignalIntervalRecord>>;

    /// Looks up a symbol by ticker, preferring live rows over soft-deleted ones.
    async fn find_symbol(&self, symbol: &str) -> Result<Option<SymbolRecord>>;
}

#[async_trait]
pub trait CandleStore: Send + Sync {
    async fn candle_exists(&self, symbol: &str, interval: &str, open_time: i64) -> Result<bool>;

    /// Inserts a closed candle. Returns `false` if the bar was already stored.
    async fn insert_candle(&self, candle: &CandleRecord) -> Result<bool>;

    /// The most recent candles, newest first.
    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>>;
}

#[async_trait]
pub trait OrderBookStore: Send + Sync {
    /// Flags the open level at `price` as closed. Returns the number of rows changed.
    async fn close_level(&self, symbol: &str, side: BookSide, price: &str) -> Result<u64>;

    /// Inserts an open level or refreshes the amount of the existing open level.
    async fn upsert_level(&self, level: &OrderBookLevelRecord) -> Result<()>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn insert_price_tick(&self, tick: &PriceTickRecord) -> Result<()>;
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn append_signal(&self, signal: &SignalRecord) -> Result<()>;
}

#[async_trait]
pub trait ErrorLogStore: Send + Sync {
    async fn append_error_log(&self, entry: &ErrorLogRecord) -> Result<()>;
}

/// Exchange historical candle endpoint, used for cold-start backfill.
#[async_trait]
pub trait HistoricalCandles: Send + Sync {
    /// Fetches up to `limit` of the most recent closed candles, oldest first.
    async fn fetch_candles(
        &self,
        exchange: &ExchangeRecord,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>>;
}
