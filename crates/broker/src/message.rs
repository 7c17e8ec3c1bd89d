//! Broker seams: publish-by-key and consume-by-offset.

use async_trait::async_trait;

use crate::error::BrokerError;

/// A message read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: u32,
    /// Position within the partition; opaque outside the broker that produced it.
    pub offset: String,
    /// Partition key, the symbol ticker for market frames
    pub key: String,
    pub value: Vec<u8>,
}

impl BrokerMessage {
    /// Payload as UTF-8 for logging.
    #[must_use]
    pub fn value_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Where a published message landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub partition: u32,
    pub offset: String,
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Appends `payload` to `topic`. No local retry; the caller decides.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<PublishReceipt, BrokerError>;

    /// Opens a consumer group session. Sessions of the same group resume from its
    /// committed position; different groups each see every message.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next message. `None` means the broker shut down.
    async fn next(&mut self) -> Result<Option<BrokerMessage>, BrokerError>;

    /// Marks `message` as processed for this group.
    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), BrokerError>;
}
