//! Closed candle (kline) records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A closed OHLCV bar. Unique by (symbol, interval, open_time) and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CandleRecord {
    /// Lowercase ticker (e.g., "btcusdt")
    pub symbol: String,
    pub exchange_id: Option<Uuid>,
    /// Interval label (e.g., "1m")
    pub interval: String,
    /// Open time in epoch milliseconds
    pub open_time: i64,
    /// Close time in epoch milliseconds
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trade_count: i64,
    pub taker_buy_base_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

impl CandleRecord {
    /// Document body mirrored into the `candlesticks` collection.
    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({
            "symbol": self.symbol,
            "exchange_id": self.exchange_id,
            "interval": self.interval,
            "open_time": self.open_time,
            "close_time": self.close_time,
            "open": self.open.to_string(),
            "high": self.high.to_string(),
            "low": self.low.to_string(),
            "close": self.close.to_string(),
            "volume": self.volume.to_string(),
            "quote_volume": self.quote_volume.to_string(),
            "trade_count": self.trade_count,
            "taker_buy_base_volume": self.taker_buy_base_volume.to_string(),
            "taker_buy_quote_volume": self.taker_buy_quote_volume.to_string(),
        })
    }
}
