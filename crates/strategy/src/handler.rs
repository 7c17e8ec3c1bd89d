//! Broker handler feeding closed klines into the engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use market_relay_broker::{BrokerMessage, MessageHandler};
use market_relay_pipeline::KlineFrame;
use tracing::debug;

use crate::engine::SignalEngine;

pub struct SignalHandler {
    engine: Arc<SignalEngine>,
}

impl SignalHandler {
    #[must_use]
    pub fn new(engine: Arc<SignalEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl MessageHandler for SignalHandler {
    async fn handle(&self, message: &BrokerMessage) -> Result<()> {
        let frame: KlineFrame =
            serde_json::from_slice(&message.value).context("Failed to parse kline frame")?;
        if !frame.kline.is_closed {
            return Ok(());
        }

        let candle = frame.to_candle(None)?;
        let outcome = self.engine.on_closed_candle(&candle).await?;
        debug!(
            symbol = %candle.symbol,
            interval = %candle.interval,
            ?outcome,
            "candle evaluated"
        );
        Ok(())
    }
}
