//! Storage for the market data relay.
//!
//! This crate provides:
//! - Storage seams ([`store`]) for reference data, candles, order book levels,
//!   price ticks, signals and the error-log trail
//! - Postgres repositories and schema migrations behind those seams
//! - A JSONB document store
//! - A key-value cache with Redis and in-memory implementations
//! - In-memory stores for tests and single-process runs

pub mod cache;
pub mod database;
pub mod documents;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod seed;
pub mod store;

pub use cache::{Cache, MemoryCache, RedisCache};
pub use database::DatabaseClient;
pub use documents::{collections, DocumentStore, PgDocumentStore};
pub use memory::{MemoryDocumentStore, MemoryHistory, MemoryStore};

pub use models::{
    CandleRecord, ErrorLogRecord, ExchangeRecord, OrderBookLevelRecord, PriceTickRecord,
    SignalIntervalRecord, SignalRecord, SymbolRecord,
};

pub use repositories::{
    CandleRepository, ErrorLogRepository, OrderBookRepository, PriceTickRepository,
    ReferenceRepository, Repositories, SignalRepository,
};

pub use store::{
    CandleStore, ErrorLogStore, HistoricalCandles, OrderBookStore, ReferenceData, SignalStore,
    TradeStore,
};
