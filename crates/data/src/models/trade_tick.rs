//! Trade tick (price tick) records.
//!
//! Each row is one aggregated trade from the exchange, linked back to the
//! raw document the document writer archived.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of a trade determined by the aggressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// Buyer was the aggressor (taker)
    Buy,
    /// Seller was the aggressor (taker)
    Sell,
}

impl TradeSide {
    /// Converts from Binance's `m` (buyer is maker) flag.
    ///
    /// ```
    /// use market_relay_data::models::trade_tick::TradeSide;
    ///
    /// assert_eq!(TradeSide::from_binance_maker_flag(true), TradeSide::Sell);
    /// assert_eq!(TradeSide::from_binance_maker_flag(false), TradeSide::Buy);
    /// ```
    #[must_use]
    pub const fn from_binance_maker_flag(buyer_is_maker: bool) -> Self {
        if buyer_is_maker {
            Self::Sell
        } else {
            Self::Buy
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// A persisted aggregated trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PriceTickRecord {
    /// Lowercase ticker
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Aggregate trade id from the exchange
    pub trade_id: i64,
    /// Trade time in epoch milliseconds
    pub trade_time: i64,
    pub is_buyer_maker: bool,
    /// Event time in epoch milliseconds
    pub event_time: i64,
    /// Event type as sent by the exchange (e.g., "aggTrade")
    pub event_type: String,
    /// Id of the archived raw document
    pub document_id: String,
}

impl PriceTickRecord {
    #[must_use]
    pub fn aggressor(&self) -> TradeSide {
        TradeSide::from_binance_maker_flag(self.is_buyer_maker)
    }

    /// Quote-currency value of the trade.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}
