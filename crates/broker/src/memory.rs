//! In-process partitioned log broker.
//!
//! Topics are split into a fixed number of partitions; a message lands in the
//! partition chosen by hashing its key, so frames for one symbol stay ordered.
//! Each consumer group keeps its own committed offset per partition, and a new
//! session for a group resumes from there, redelivering anything uncommitted.
//!
//! Offsets are absolute. Entries every group has committed are released, and an
//! optional per-partition cap drops the oldest entries the way `MAXLEN` does.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use market_relay_core::InitialOffset;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::BrokerError;
use crate::message::{BrokerMessage, MessageBroker, PublishReceipt, Subscription};

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    value: Vec<u8>,
}

/// One partition: `entries[0]` sits at offset `base`.
#[derive(Debug, Clone, Default)]
struct PartitionLog {
    base: u64,
    entries: VecDeque<Entry>,
}

impl PartitionLog {
    fn end(&self) -> u64 {
        self.base + self.entries.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&Entry> {
        let index = offset.checked_sub(self.base)?;
        self.entries.get(usize::try_from(index).ok()?)
    }

    /// Drops entries below `offset`.
    fn release_before(&mut self, offset: u64) {
        while self.base < offset && self.entries.pop_front().is_some() {
            self.base += 1;
        }
    }
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<PartitionLog>>,
    /// (topic, group) -> next offset to deliver, per partition
    committed: HashMap<(String, String), Vec<u64>>,
    closed: bool,
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    partitions: u32,
    initial_offset: InitialOffset,
    /// Per-partition cap; 0 keeps everything not yet committed by every group
    max_len: usize,
}

/// Broker that keeps every topic in process memory.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Creates a broker whose topics have `partitions` partitions each (at least one).
    #[must_use]
    pub fn new(partitions: u32, initial_offset: InitialOffset) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                partitions: partitions.max(1),
                initial_offset,
                max_len: 0,
            }),
        }
    }

    /// Like [`MemoryBroker::new`], keeping at most `max_len` entries per partition.
    /// Readers that fall behind the cap skip to the oldest retained entry.
    #[must_use]
    pub fn with_max_len(partitions: u32, initial_offset: InitialOffset, max_len: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                partitions: partitions.max(1),
                initial_offset,
                max_len,
            }),
        }
    }

    /// Single partition, new groups start from the beginning of the log.
    #[must_use]
    pub fn single_partition() -> Self {
        Self::new(1, InitialOffset::Earliest)
    }

    /// Wakes every subscription and makes further reads return `None`.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    /// Messages of `topic` still held in memory.
    #[must_use]
    pub fn len(&self, topic: &str) -> usize {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .map_or(0, |parts| parts.iter().map(|p| p.entries.len()).sum())
    }

    #[must_use]
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Retained messages of `topic`, partition by partition, as (key, value).
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<(String, Vec<u8>)> {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .map(|parts| {
                parts
                    .iter()
                    .flat_map(|p| p.entries.iter())
                    .map(|e| (e.key.clone(), e.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Committed position of a group on one partition, if the group exists.
    #[must_use]
    pub fn committed(&self, topic: &str, group: &str, partition: u32) -> Option<u64> {
        self.inner
            .state
            .lock()
            .committed
            .get(&(topic.to_string(), group.to_string()))
            .and_then(|offsets| offsets.get(partition as usize).copied())
    }

    fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.inner.partitions)) as u32
    }
}

fn empty_topic(partitions: u32) -> Vec<PartitionLog> {
    vec![PartitionLog::default(); partitions as usize]
}

impl State {
    /// Releases the prefix of one partition that every group of `topic` has committed.
    fn release_committed(&mut self, topic: &str, partition: usize) {
        let floor = self
            .committed
            .iter()
            .filter(|((t, _), _)| t == topic)
            .filter_map(|(_, offsets)| offsets.get(partition).copied())
            .min();
        if let (Some(floor), Some(log)) = (
            floor,
            self.topics.get_mut(topic).and_then(|p| p.get_mut(partition)),
        ) {
            log.release_before(floor);
        }
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<PublishReceipt, BrokerError> {
        let partition = self.partition_for(key);
        let offset = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let parts = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| empty_topic(self.inner.partitions));
            let log = &mut parts[partition as usize];
            let offset = log.end();
            log.entries.push_back(Entry {
                key: key.to_string(),
                value: payload.to_vec(),
            });
            if self.inner.max_len > 0 && log.entries.len() > self.inner.max_len {
                let excess = (log.entries.len() - self.inner.max_len) as u64;
                let keep_from = log.base + excess;
                log.release_before(keep_from);
            }
            offset
        };
        self.inner.notify.notify_waiters();

        Ok(PublishReceipt {
            partition,
            offset: offset.to_string(),
        })
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        let cursors = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let parts = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| empty_topic(self.inner.partitions));
            let starting: Vec<u64> = match self.inner.initial_offset {
                InitialOffset::Earliest => vec![0; parts.len()],
                InitialOffset::Latest => parts.iter().map(PartitionLog::end).collect(),
            };
            state
                .committed
                .entry((topic.to_string(), group.to_string()))
                .or_insert(starting)
                .clone()
        };

        Ok(Box::new(MemorySubscription {
            inner: Arc::clone(&self.inner),
            topic: topic.to_string(),
            group: group.to_string(),
            cursors,
            next_partition: 0,
        }))
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    topic: String,
    group: String,
    /// Next offset to read per partition; runs ahead of the committed position.
    cursors: Vec<u64>,
    next_partition: usize,
}

impl MemorySubscription {
    fn try_next(&mut self, state: &State) -> Option<BrokerMessage> {
        let parts = state.topics.get(&self.topic)?;
        let count = parts.len();
        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            let log = &parts[partition];
            // Entries below the base were trimmed by the cap.
            let cursor = self.cursors[partition].max(log.base);
            if let Some(entry) = log.get(cursor) {
                self.cursors[partition] = cursor + 1;
                self.next_partition = (partition + 1) % count;
                return Some(BrokerMessage {
                    topic: self.topic.clone(),
                    partition: partition as u32,
                    offset: cursor.to_string(),
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                });
            }
        }
        None
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<BrokerMessage>, BrokerError> {
        let inner = Arc::clone(&self.inner);
        loop {
            let notified = inner.notify.notified();
            {
                let state = inner.state.lock();
                if let Some(message) = self.try_next(&state) {
                    return Ok(Some(message));
                }
                if state.closed {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn commit(&mut self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let unknown = || BrokerError::UnknownOffset {
            topic: message.topic.clone(),
            offset: message.offset.clone(),
        };
        let offset: u64 = message.offset.parse().map_err(|_| unknown())?;

        let mut state = self.inner.state.lock();
        let committed = state
            .committed
            .get_mut(&(self.topic.clone(), self.group.clone()))
            .ok_or_else(unknown)?;
        let slot = committed
            .get_mut(message.partition as usize)
            .ok_or_else(unknown)?;
        *slot = (*slot).max(offset + 1);
        state.release_committed(&self.topic, message.partition as usize);
        Ok(())
    }
}
