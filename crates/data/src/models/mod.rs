//! Data models for the market data relay.
//!
//! Candle and tick values use `rust_decimal::Decimal` for precision; order
//! book prices stay as exchange-formatted strings. Models derive
//! `sqlx::FromRow` for database compatibility.

pub mod candle;
pub mod error_log;
pub mod orderbook;
pub mod reference;
pub mod signal;
pub mod trade_tick;

pub use candle::CandleRecord;
pub use error_log::{ErrorLogRecord, LogKind};
pub use orderbook::{level_document_key, OrderBookLevelRecord};
pub use reference::{ExchangeRecord, SignalIntervalRecord, SymbolRecord};
pub use signal::SignalRecord;
pub use trade_tick::{PriceTickRecord, TradeSide};
