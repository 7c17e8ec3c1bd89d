//! Archives raw frames into the document store and forwards them for relational
//! processing.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use market_relay_broker::{BrokerMessage, MessageBroker, MessageHandler};
use market_relay_core::TopicsConfig;
use market_relay_data::{collections, DocumentStore};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use crate::frames::Envelope;

pub struct DocumentWriter {
    documents: Arc<dyn DocumentStore>,
    broker: Arc<dyn MessageBroker>,
    collection: String,
    forward_topic: Option<String>,
}

impl DocumentWriter {
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        broker: Arc<dyn MessageBroker>,
        collection: impl Into<String>,
        forward_topic: Option<String>,
    ) -> Self {
        Self {
            documents,
            broker,
            collection: collection.into(),
            forward_topic,
        }
    }

    /// Raw trades into `agg_trades`, forwarded to the relational trade topic.
    #[must_use]
    pub fn trades(
        documents: Arc<dyn DocumentStore>,
        broker: Arc<dyn MessageBroker>,
        topics: &TopicsConfig,
    ) -> Self {
        Self::new(
            documents,
            broker,
            collections::AGG_TRADES,
            Some(topics.relational_trade.clone()),
        )
    }

    /// Raw depth frames into `order_books`, forwarded to the relational depth topic.
    #[must_use]
    pub fn depth(
        documents: Arc<dyn DocumentStore>,
        broker: Arc<dyn MessageBroker>,
        topics: &TopicsConfig,
    ) -> Self {
        Self::new(
            documents,
            broker,
            collections::ORDER_BOOKS,
            Some(topics.relational_depth.clone()),
        )
    }

    /// Raw kline frames into `candlestick_frames`; relational candles read the raw topic.
    #[must_use]
    pub fn candles(documents: Arc<dyn DocumentStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self::new(documents, broker, collections::CANDLESTICK_FRAMES, None)
    }

    /// Stores one frame and returns the document id.
    ///
    /// # Errors
    /// Returns an error if the payload is not JSON or the insert fails.
    pub async fn archive(&self, message: &BrokerMessage) -> Result<String> {
        let document: JsonValue = serde_json::from_slice(&message.value)
            .with_context(|| format!("Frame on {} is not JSON", message.topic))?;
        let document_id = self
            .documents
            .insert(&self.collection, &document)
            .await
            .with_context(|| format!("Failed to insert into {}", self.collection))?;
        debug!(collection = %self.collection, %document_id, "archived frame");

        if let Some(topic) = &self.forward_topic {
            let envelope = Envelope {
                document_id: document_id.clone(),
                value: document,
            };
            let payload = serde_json::to_vec(&envelope)?;
            // The document stays even if forwarding fails.
            if let Err(e) = self.broker.publish(topic, &message.key, &payload).await {
                error!(
                    topic = %topic,
                    key = %message.key,
                    %document_id,
                    error = %e,
                    "failed to forward archived frame"
                );
            }
        }
        Ok(document_id)
    }
}

#[async_trait]
impl MessageHandler for DocumentWriter {
    async fn handle(&self, message: &BrokerMessage) -> Result<()> {
        self.archive(message).await.map(|_| ())
    }
}
