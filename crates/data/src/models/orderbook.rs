//! Order book level records.
//!
//! Prices and amounts stay string-encoded exactly as the exchange sent them,
//! since the string form is the identity of a level across snapshots.

use market_relay_core::{BookSide, LevelStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// A single price level on one side of a symbol's book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderBookLevelRecord {
    pub symbol: String,
    pub exchange_id: Option<Uuid>,
    pub price: String,
    pub amount: String,
    /// "bid" or "ask"
    pub side: String,
    /// "open" or "closed"
    pub status: String,
}

impl OrderBookLevelRecord {
    /// Creates an open level.
    pub fn open(
        symbol: impl Into<String>,
        exchange_id: Option<Uuid>,
        side: BookSide,
        price: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange_id,
            price: price.into(),
            amount: amount.into(),
            side: side.as_str().to_string(),
            status: LevelStatus::Open.as_str().to_string(),
        }
    }

    #[must_use]
    pub fn parsed_status(&self) -> Option<LevelStatus> {
        LevelStatus::parse(&self.status)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.parsed_status() == Some(LevelStatus::Open)
    }

    /// Key of the mirrored document: one document per (symbol, price, side).
    #[must_use]
    pub fn document_key(&self) -> String {
        level_document_key(&self.symbol, &self.price, &self.side)
    }

    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        json!({
            "symbol": self.symbol,
            "exchange_id": self.exchange_id,
            "price": self.price,
            "amount": self.amount,
            "side": self.side,
            "status": self.status,
        })
    }
}

/// Builds the document key for a level.
#[must_use]
pub fn level_document_key(symbol: &str, price: &str, side: &str) -> String {
    format!("{symbol}:{side}:{price}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_level_has_open_status() {
        let level = OrderBookLevelRecord::open("btcusdt", None, BookSide::Bid, "48000.00", "1.0");
        assert!(level.is_open());
        assert_eq!(level.side, "bid");
        assert_eq!(level.document_key(), "btcusdt:bid:48000.00");
    }

    #[test]
    fn document_mirrors_status_and_amount() {
        let level = OrderBookLevelRecord::open("ethusdt", None, BookSide::Ask, "2500.5", "3");
        let doc = level.to_document();
        assert_eq!(doc["status"], "open");
        assert_eq!(doc["amount"], "3");
        assert_eq!(doc["side"], "ask");
    }
}
