//! Reference data: exchanges, symbols and signal intervals.
//!
//! These rows are managed by the administrative surface and only read by
//! the relay. They are soft-deleted via `deleted_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An exchange the relay streams from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExchangeRecord {
    pub id: Uuid,
    /// Display name (e.g., "binance")
    pub name: String,
    /// Streaming base URL (e.g., "wss://stream.binance.com:443/ws")
    pub ws_url: String,
    /// Historical REST base URL (e.g., "https://api.binance.com/api/v3")
    pub rest_url: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ExchangeRecord {
    /// Creates a new active exchange with a fresh id.
    pub fn new(
        name: impl Into<String>,
        ws_url: impl Into<String>,
        rest_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ws_url: ws_url.into(),
            rest_url: rest_url.into(),
            is_active: true,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// A ticker traded on an exchange. The ticker is always stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SymbolRecord {
    pub id: Uuid,
    pub exchange_id: Uuid,
    pub symbol: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SymbolRecord {
    pub fn new(exchange_id: Uuid, symbol: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange_id,
            symbol: market_relay_core::normalize_symbol(symbol),
            is_active: true,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// A (symbol, interval) pair the signal engine tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalIntervalRecord {
    pub id: Uuid,
    pub exchange_id: Uuid,
    pub symbol: String,
    /// Interval label (e.g., "1m", "1h")
    pub interval: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SignalIntervalRecord {
    pub fn new(exchange_id: Uuid, symbol: &str, interval: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            exchange_id,
            symbol: market_relay_core::normalize_symbol(symbol),
            interval: interval.into(),
            is_active: true,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_is_normalized_on_creation() {
        let exchange = ExchangeRecord::new("binance", "wss://x/ws", "https://x/api/v3");
        let symbol = SymbolRecord::new(exchange.id, "BTCUSDT");
        assert_eq!(symbol.symbol, "btcusdt");
        assert!(symbol.is_live());
    }

    #[test]
    fn soft_deleted_rows_are_not_live() {
        let mut exchange = ExchangeRecord::new("binance", "wss://x/ws", "https://x/api/v3");
        exchange.deleted_at = Some(Utc::now());
        assert!(!exchange.is_live());

        let mut interval = SignalIntervalRecord::new(exchange.id, "ETHUSDT", "1h");
        interval.is_active = false;
        assert!(!interval.is_live());
        assert_eq!(interval.symbol, "ethusdt");
    }
}
