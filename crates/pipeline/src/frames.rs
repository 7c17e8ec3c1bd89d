//! Exchange frame DTOs and the document-writer envelope.

use std::str::FromStr;

use market_relay_core::{normalize_symbol, BookSide};
use market_relay_data::{CandleRecord, PriceTickRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::FrameError;

/// Aggregated trade (`@aggTrade`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggTradeFrame {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    /// Aggregate trade id
    #[serde(rename = "a")]
    pub trade_id: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

impl AggTradeFrame {
    /// # Errors
    /// Returns an error if price or quantity is not a decimal.
    pub fn to_price_tick(
        &self,
        document_id: impl Into<String>,
    ) -> Result<PriceTickRecord, FrameError> {
        Ok(PriceTickRecord {
            symbol: normalize_symbol(&self.symbol),
            price: parse_decimal("price", &self.price)?,
            quantity: parse_decimal("quantity", &self.quantity)?,
            trade_id: self.trade_id,
            trade_time: self.trade_time,
            is_buyer_maker: self.is_buyer_maker,
            event_time: self.event_time,
            event_type: self.event_type.clone(),
            document_id: document_id.into(),
        })
    }
}

/// A price or amount as sent on the wire: usually a string, sometimes a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireDecimal {
    Text(String),
    Number(serde_json::Number),
}

impl WireDecimal {
    /// Textual form; this is the identity of a price level.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            WireDecimal::Text(s) => s.clone(),
            WireDecimal::Number(n) => n.to_string(),
        }
    }
}

/// Order book depth frame (`@depth`), treated as a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthFrame {
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    /// Missing on partial-book payloads; the message key stands in.
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "U", default)]
    pub first_update_id: Option<u64>,
    #[serde(rename = "u", alias = "lastUpdateId", default)]
    pub last_update_id: Option<u64>,
    #[serde(rename = "b", alias = "bids", default)]
    pub bids: Vec<(WireDecimal, WireDecimal)>,
    #[serde(rename = "a", alias = "asks", default)]
    pub asks: Vec<(WireDecimal, WireDecimal)>,
}

impl DepthFrame {
    /// (price, amount) pairs for one side in frame order.
    #[must_use]
    pub fn levels(&self, side: BookSide) -> Vec<(String, String)> {
        let raw = match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        };
        raw.iter()
            .map(|(price, amount)| (price.as_text(), amount.as_text()))
            .collect()
    }
}

/// Kline frame (`@kline_{interval}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineFrame {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlineBar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineBar {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n")]
    pub trade_count: i64,
    /// Whether this bar is final
    #[serde(rename = "x")]
    pub is_closed: bool,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "V")]
    pub taker_buy_base_volume: String,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: String,
}

impl KlineFrame {
    /// # Errors
    /// Returns an error if any price or volume is not a decimal.
    pub fn to_candle(&self, exchange_id: Option<uuid::Uuid>) -> Result<CandleRecord, FrameError> {
        let k = &self.kline;
        Ok(CandleRecord {
            symbol: normalize_symbol(&k.symbol),
            exchange_id,
            interval: k.interval.clone(),
            open_time: k.open_time,
            close_time: k.close_time,
            open: parse_decimal("open", &k.open)?,
            high: parse_decimal("high", &k.high)?,
            low: parse_decimal("low", &k.low)?,
            close: parse_decimal("close", &k.close)?,
            volume: parse_decimal("volume", &k.volume)?,
            quote_volume: parse_decimal("quote_volume", &k.quote_volume)?,
            trade_count: k.trade_count,
            taker_buy_base_volume: parse_decimal("taker_buy_base", &k.taker_buy_base_volume)?,
            taker_buy_quote_volume: parse_decimal("taker_buy_quote", &k.taker_buy_quote_volume)?,
        })
    }
}

/// What the document writer forwards to relational consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub document_id: String,
    pub value: JsonValue,
}

impl Envelope {
    /// Parses an envelope; a `value` carried as a JSON string is decoded in place.
    ///
    /// # Errors
    /// Returns an error if the payload is not an envelope.
    pub fn from_slice(payload: &[u8]) -> Result<Self, FrameError> {
        let mut envelope: Envelope = serde_json::from_slice(payload).map_err(FrameError::Envelope)?;
        if let JsonValue::String(raw) = &envelope.value {
            envelope.value = serde_json::from_str(raw).map_err(FrameError::Envelope)?;
        }
        Ok(envelope)
    }
}

/// Decodes a depth payload that is either a raw frame or an envelope around one.
///
/// # Errors
/// Returns an error if neither shape parses.
pub fn decode_depth(payload: &[u8]) -> Result<DepthFrame, FrameError> {
    let value: JsonValue = serde_json::from_slice(payload)?;
    let frame = if value.get("document_id").is_some() && value.get("value").is_some() {
        Envelope::from_slice(payload)?.value
    } else {
        value
    };
    Ok(serde_json::from_value(frame)?)
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, FrameError> {
    Decimal::from_str(raw).map_err(|_| FrameError::InvalidDecimal {
        field,
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn agg_trade_maps_to_price_tick() {
        let frame: AggTradeFrame = serde_json::from_value(json!({
            "e": "aggTrade", "E": 1_700_000_000_100_i64, "s": "BTCUSDT",
            "a": 26_129, "p": "37000.50", "q": "0.015",
            "f": 100, "l": 105, "T": 1_700_000_000_099_i64, "m": true, "M": true
        }))
        .unwrap();

        let tick = frame.to_price_tick("doc-1").unwrap();
        assert_eq!(tick.symbol, "btcusdt");
        assert_eq!(tick.price, dec!(37000.50));
        assert_eq!(tick.quantity, dec!(0.015));
        assert_eq!(tick.trade_id, 26_129);
        assert!(tick.is_buyer_maker);
        assert_eq!(tick.document_id, "doc-1");
    }

    #[test]
    fn depth_accepts_string_and_numeric_levels() {
        let frame: DepthFrame = serde_json::from_value(json!({
            "e": "depthUpdate", "E": 1, "s": "BTCUSDT", "U": 10, "u": 11,
            "b": [["48000.00", "1.0"]],
            "a": [[48001.5, 0.0]]
        }))
        .unwrap();

        assert_eq!(frame.levels(BookSide::Bid), vec![("48000.00".into(), "1.0".into())]);
        assert_eq!(frame.levels(BookSide::Ask), vec![("48001.5".into(), "0.0".into())]);
    }

    #[test]
    fn partial_book_payload_uses_long_field_names() {
        let frame: DepthFrame = serde_json::from_value(json!({
            "lastUpdateId": 160,
            "bids": [["0.0024", "10"]],
            "asks": []
        }))
        .unwrap();
        assert!(frame.symbol.is_none());
        assert_eq!(frame.last_update_id, Some(160));
        assert_eq!(frame.levels(BookSide::Bid).len(), 1);
    }

    #[test]
    fn depth_is_decoded_from_envelope_or_raw() {
        let raw = json!({"s": "ETHUSDT", "b": [["2000.1", "3"]], "a": []});
        let from_raw = decode_depth(raw.to_string().as_bytes()).unwrap();

        let wrapped = json!({"document_id": "abc", "value": raw});
        let from_envelope = decode_depth(wrapped.to_string().as_bytes()).unwrap();

        let stringly = json!({"document_id": "abc", "value": raw.to_string()});
        let from_string = decode_depth(stringly.to_string().as_bytes()).unwrap();

        assert_eq!(from_raw, from_envelope);
        assert_eq!(from_raw, from_string);
        assert!(decode_depth(b"not json").is_err());
    }

    #[test]
    fn kline_maps_to_candle() {
        let frame: KlineFrame = serde_json::from_value(json!({
            "e": "kline", "E": 1_700_000_060_001_i64, "s": "BTCUSDT",
            "k": {
                "t": 1_700_000_000_000_i64, "T": 1_700_000_059_999_i64,
                "s": "BTCUSDT", "i": "1m", "f": 100, "L": 200,
                "o": "37000.0", "c": "37010.5", "h": "37020.0", "l": "36990.0",
                "v": "10.5", "n": 101, "x": true, "q": "388500.0",
                "V": "5.0", "Q": "185000.0", "B": "0"
            }
        }))
        .unwrap();

        assert!(frame.kline.is_closed);
        let candle = frame.to_candle(None).unwrap();
        assert_eq!(candle.symbol, "btcusdt");
        assert_eq!(candle.interval, "1m");
        assert_eq!(candle.close, dec!(37010.5));
        assert_eq!(candle.trade_count, 101);
    }

    #[test]
    fn bad_trade_price_names_the_field() {
        let frame: AggTradeFrame = serde_json::from_value(json!({
            "e": "aggTrade", "E": 1, "s": "BTCUSDT",
            "a": 1, "p": "n/a", "q": "0.1", "T": 1, "m": false
        }))
        .unwrap();

        match frame.to_price_tick("doc").unwrap_err() {
            FrameError::InvalidDecimal { field, raw } => {
                assert_eq!(field, "price");
                assert_eq!(raw, "n/a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn envelope_with_unparseable_string_value_is_rejected() {
        let payload = json!({"document_id": "abc", "value": "{not json"}).to_string();
        assert!(matches!(
            Envelope::from_slice(payload.as_bytes()),
            Err(FrameError::Envelope(_))
        ));
    }
}
