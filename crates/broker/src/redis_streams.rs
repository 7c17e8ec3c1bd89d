//! Redis Streams broker.
//!
//! One stream per topic. Consumer groups map onto Redis consumer groups; a
//! session first drains its own pending list (delivered but never acked) and
//! then reads new entries, so an uncommitted message is seen again after a
//! restart. Redis streams have no partitions, so every receipt reports 0.

use async_trait::async_trait;
use market_relay_core::{BrokerConfig, InitialOffset};
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisResult};
use tracing::{info, warn};

use crate::error::BrokerError;
use crate::message::{BrokerMessage, MessageBroker, PublishReceipt, Subscription};

const KEY_FIELD: &str = "key";
const VALUE_FIELD: &str = "value";

#[derive(Clone)]
pub struct RedisStreamBroker {
    client: redis::Client,
    conn: ConnectionManager,
    max_len: usize,
    block_ms: usize,
    initial_offset: InitialOffset,
}

impl RedisStreamBroker {
    /// Connects to Redis, retrying `config.connect_attempts` times.
    ///
    /// # Errors
    /// Returns [`BrokerError::Unreachable`] once every attempt has failed.
    pub async fn connect_with_retry(url: &str, config: &BrokerConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)?;
        let attempts = config.connect_attempts.max(1);
        let delay = config.connect_delay();

        let mut attempt = 0;
        let conn = loop {
            attempt += 1;
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => break conn,
                Err(source) if attempt >= attempts => {
                    return Err(BrokerError::Unreachable { attempts, source });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        "broker connection failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        info!(attempt, "connected to redis streams broker");
        Ok(Self {
            client,
            conn,
            max_len: config.stream_max_len,
            block_ms: config.block_ms,
            initial_offset: config.initial_offset,
        })
    }

    async fn ensure_group(&self, topic: &str, group: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let start = match self.initial_offset {
            InitialOffset::Earliest => "0",
            InitialOffset::Latest => "$",
        };
        let created: RedisResult<()> = conn.xgroup_create_mkstream(topic, group, start).await;
        match created {
            Ok(()) => {
                info!(topic, group, "created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageBroker for RedisStreamBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<PublishReceipt, BrokerError> {
        let mut conn = self.conn.clone();
        let fields: [(&str, &[u8]); 2] = [(KEY_FIELD, key.as_bytes()), (VALUE_FIELD, payload)];
        let id: String = if self.max_len > 0 {
            conn.xadd_maxlen(topic, StreamMaxlen::Approx(self.max_len), "*", &fields)
                .await?
        } else {
            conn.xadd(topic, "*", &fields).await?
        };

        Ok(PublishReceipt {
            partition: 0,
            offset: id,
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        self.ensure_group(topic, group).await?;
        // Blocking reads get their own connection so they never stall publishers.
        let conn = self.client.get_multiplexed_async_connection().await?;

        Ok(Box::new(RedisStreamSubscription {
            conn,
            topic: topic.to_string(),
            group: group.to_string(),
            consumer: format!("{group}-relay"),
            block_ms: self.block_ms,
            cursor: ReadCursor::default(),
        }))
    }
}

/// Where the next `XREADGROUP` reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadCursor {
    /// Replaying this consumer's pending list after the given id.
    Pending(String),
    /// Pending list drained; only new entries.
    New,
}

impl Default for ReadCursor {
    fn default() -> Self {
        Self::Pending("0".to_string())
    }
}

impl ReadCursor {
    fn read_id(&self) -> &str {
        match self {
            Self::Pending(id) => id,
            Self::New => ">",
        }
    }

    fn blocks(&self) -> bool {
        matches!(self, Self::New)
    }

    /// Moves past `entry_id`, or onto new entries once the pending list came back empty.
    fn advance(&mut self, entry_id: Option<&str>) {
        if let Self::Pending(_) = self {
            *self = match entry_id {
                Some(id) => Self::Pending(id.to_string()),
                None => Self::New,
            };
        }
    }
}

fn decode_entry(topic: &str, entry: &StreamId) -> Result<BrokerMessage, BrokerError> {
    let malformed = |reason: &str| BrokerError::MalformedEntry {
        topic: topic.to_string(),
        id: entry.id.clone(),
        reason: reason.to_string(),
    };
    let key: String = entry.get(KEY_FIELD).ok_or_else(|| malformed("missing key"))?;
    let value: Vec<u8> = entry
        .get(VALUE_FIELD)
        .ok_or_else(|| malformed("missing value"))?;

    Ok(BrokerMessage {
        topic: topic.to_string(),
        partition: 0,
        offset: entry.id.clone(),
        key,
        value,
    })
}

struct RedisStreamSubscription {
    conn: MultiplexedConnection,
    topic: String,
    group: String,
    consumer: String,
    block_ms: usize,
    cursor: ReadCursor,
}

#[async_trait]
impl Subscription for RedisStreamSubscription {
    async fn next(&mut self) -> Result<Option<BrokerMessage>, BrokerError> {
        loop {
            let base = StreamReadOptions::default()
                .group(&self.group, &self.consumer)
                .count(1);
            let options = if self.cursor.blocks() {
                base.block(self.block_ms)
            } else {
                base
            };
            let id = self.cursor.read_id().to_string();

            let reply: Option<StreamReadReply> = self
                .conn
                .xread_options(&[&self.topic], &[&id], &options)
                .await?;
            let entry = reply
                .and_then(|r| r.keys.into_iter().next())
                .and_then(|k| k.ids.into_iter().next());

            let drained = entry.is_none() && !self.cursor.blocks();
            self.cursor.advance(entry.as_ref().map(|e| e.id.as_str()));

            match entry {
                Some(entry) => match decode_entry(&self.topic, &entry) {
                    Ok(message) => return Ok(Some(message)),
                    Err(e) => {
                        // Nothing downstream can use it; ack so it is not redelivered.
                        warn!(error = %e, "dropping malformed stream entry");
                        let _: i64 = self
                            .conn
                            .xack(&self.topic, &self.group, &[&entry.id])
                            .await?;
                    }
                },
                None if drained => {
                    info!(topic = %self.topic, group = %self.group, "pending entries replayed");
                }
                // block timeout, poll again
                None => {}
            }
        }
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let _: i64 = self
            .conn
            .xack(&self.topic, &self.group, &[&message.offset])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(id: &str, fields: &[(&str, &[u8])]) -> StreamId {
        StreamId {
            id: id.to_string(),
            map: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), redis::Value::BulkString(v.to_vec())))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn entry_fields_become_the_message() {
        let raw = entry("1700000000000-0", &[("key", b"btcusdt"), ("value", b"{\"b\":[]}")]);
        let message = decode_entry("depth-data", &raw).unwrap();

        assert_eq!(message.topic, "depth-data");
        assert_eq!(message.partition, 0);
        assert_eq!(message.offset, "1700000000000-0");
        assert_eq!(message.key, "btcusdt");
        assert_eq!(message.value, b"{\"b\":[]}");
    }

    #[test]
    fn entry_without_value_is_malformed() {
        let raw = entry("5-0", &[("key", b"btcusdt")]);
        match decode_entry("depth-data", &raw) {
            Err(BrokerError::MalformedEntry { id, reason, .. }) => {
                assert_eq!(id, "5-0");
                assert_eq!(reason, "missing value");
            }
            other => panic!("expected malformed entry, got {other:?}"),
        }
        assert!(decode_entry("t", &entry("6-0", &[("value", b"x")])).is_err());
    }

    #[test]
    fn cursor_replays_pending_then_switches_to_new_entries() {
        let mut cursor = ReadCursor::default();
        assert_eq!(cursor.read_id(), "0");
        assert!(!cursor.blocks());

        cursor.advance(Some("10-0"));
        assert_eq!(cursor.read_id(), "10-0");
        cursor.advance(Some("12-3"));
        assert_eq!(cursor, ReadCursor::Pending("12-3".to_string()));

        cursor.advance(None);
        assert_eq!(cursor.read_id(), ">");
        assert!(cursor.blocks());

        // New-entry reads never go back to the pending list.
        cursor.advance(Some("13-0"));
        assert_eq!(cursor, ReadCursor::New);
        cursor.advance(None);
        assert_eq!(cursor, ReadCursor::New);
    }
}
