//! Message broker client and consumer group runtime.
//!
//! Producers publish market frames keyed by symbol; consumer groups each read
//! the whole topic independently and commit their own offsets. Two brokers
//! implement the seam: Redis Streams for deployments and an in-process log
//! for tests and single-binary runs.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod message;
pub mod redis_streams;

use std::sync::Arc;

use market_relay_core::{BrokerConfig, BrokerKind};

pub use consumer::{CommitPolicy, ConsumerGroup, ConsumerStats, MessageHandler};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use message::{BrokerMessage, MessageBroker, PublishReceipt, Subscription};
pub use redis_streams::RedisStreamBroker;

/// Builds the broker selected by `config.kind`.
///
/// # Errors
/// Returns an error if the Redis broker stays unreachable.
pub async fn connect(redis_url: &str, config: &BrokerConfig) -> Result<Arc<dyn MessageBroker>, BrokerError> {
    match config.kind {
        BrokerKind::Redis => Ok(Arc::new(
            RedisStreamBroker::connect_with_retry(redis_url, config).await?,
        )),
        BrokerKind::Memory => Ok(Arc::new(MemoryBroker::with_max_len(
            config.partitions,
            config.initial_offset,
            config.stream_max_len,
        ))),
    }
}
