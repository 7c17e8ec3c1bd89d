//! Crossover signal audit records.
//!
//! Every directional signal the engine emits is appended here together with
//! the moving averages that produced it. Rows are never updated or deleted.

use chrono::{DateTime, Utc};
use market_relay_core::SignalDirection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalRecord {
    pub id: Uuid,
    pub symbol: String,
    /// Interval label the signal was computed on (e.g., "1m")
    pub timeframe: String,
    /// "buy", "sell" or "hold"
    pub signal: String,
    /// Indicator snapshot: `{"MA50": "...", "MA200": "..."}`
    pub indicator: JsonValue,
    /// Last trade snapshot; empty object when no trade context is attached
    pub last_trade: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl SignalRecord {
    /// Creates a new audit record for an emitted crossover.
    pub fn crossover(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        direction: SignalDirection,
        ma50: Decimal,
        ma200: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            signal: direction.as_str().to_string(),
            indicator: json!({
                "MA50": ma50.to_string(),
                "MA200": ma200.to_string(),
            }),
            last_trade: JsonValue::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    /// Document body mirrored into the `signals` collection.
    #[must_use]
    pub fn to_document(&self) -> JsonValue {
        json!({
            "id": self.id,
            "symbol": self.symbol,
            "timeframe": self.timeframe,
            "signal": self.signal,
            "indicator": self.indicator,
            "last_trade": self.last_trade,
            "created_at": self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn crossover_records_indicator_snapshot() {
        let record =
            SignalRecord::crossover("btcusdt", "1m", SignalDirection::Buy, dec!(200), dec!(100));

        assert_eq!(record.signal, "buy");
        assert_eq!(record.indicator["MA50"], "200");
        assert_eq!(record.indicator["MA200"], "100");
        assert_eq!(record.last_trade, json!({}));
    }

    #[test]
    fn document_carries_the_record_id() {
        let record =
            SignalRecord::crossover("ethusdt", "1h", SignalDirection::Sell, dec!(90), dec!(95));
        let doc = record.to_document();
        assert_eq!(doc["id"], json!(record.id));
        assert_eq!(doc["signal"], "sell");
        assert_eq!(doc["last_trade"], json!({}));
    }
}
