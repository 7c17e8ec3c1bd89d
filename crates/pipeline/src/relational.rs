//! Relational writers for trades and candles.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use market_relay_broker::{BrokerMessage, MessageHandler};
use market_relay_data::{CandleStore, ReferenceData, TradeStore};
use tracing::{debug, warn};

use crate::frames::{AggTradeFrame, Envelope, KlineFrame};

/// Maps forwarded trade envelopes to price ticks.
pub struct TradeWriter {
    store: Arc<dyn TradeStore>,
}

impl TradeWriter {
    #[must_use]
    pub fn new(store: Arc<dyn TradeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for TradeWriter {
    async fn handle(&self, message: &BrokerMessage) -> Result<()> {
        let envelope = Envelope::from_slice(&message.value)?;
        let frame: AggTradeFrame =
            serde_json::from_value(envelope.value).context("Failed to parse trade frame")?;
        let tick = frame.to_price_tick(envelope.document_id)?;

        self.store
            .insert_price_tick(&tick)
            .await
            .with_context(|| format!("Failed to insert trade {} for {}", tick.trade_id, tick.symbol))?;
        debug!(
            symbol = %tick.symbol,
            trade_id = tick.trade_id,
            side = tick.aggressor().as_str(),
            "price tick stored"
        );
        Ok(())
    }
}

/// What happened to one kline frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleWrite {
    /// Bar still forming
    NotClosed,
    Duplicate,
    Inserted,
}

/// Stores closed candles from the raw kline topic, once per (symbol, interval, open time).
pub struct CandleWriter {
    candles: Arc<dyn CandleStore>,
    reference: Arc<dyn ReferenceData>,
}

impl CandleWriter {
    #[must_use]
    pub fn new(candles: Arc<dyn CandleStore>, reference: Arc<dyn ReferenceData>) -> Self {
        Self { candles, reference }
    }

    /// # Errors
    /// Returns an error if the frame is malformed or a store call fails.
    pub async fn write(&self, frame: &KlineFrame) -> Result<CandleWrite> {
        if !frame.kline.is_closed {
            return Ok(CandleWrite::NotClosed);
        }

        let exchange_id = match self.reference.find_symbol(&frame.symbol).await {
            Ok(symbol) => symbol.map(|s| s.exchange_id),
            Err(e) => {
                warn!(symbol = %frame.symbol, error = %e, "symbol lookup failed");
                None
            }
        };
        let candle = frame.to_candle(exchange_id)?;

        if self
            .candles
            .candle_exists(&candle.symbol, &candle.interval, candle.open_time)
            .await?
        {
            debug!(
                symbol = %candle.symbol,
                interval = %candle.interval,
                open_time = candle.open_time,
                "candle already stored"
            );
            return Ok(CandleWrite::Duplicate);
        }

        if self.candles.insert_candle(&candle).await? {
            Ok(CandleWrite::Inserted)
        } else {
            Ok(CandleWrite::Duplicate)
        }
    }
}

#[async_trait]
impl MessageHandler for CandleWriter {
    async fn handle(&self, message: &BrokerMessage) -> Result<()> {
        let frame: KlineFrame =
            serde_json::from_slice(&message.value).context("Failed to parse kline frame")?;
        self.write(&frame).await.map(|_| ())
    }
}
