//! Stream connection supervisor.
//!
//! For each active exchange and each of its live symbols the supervisor runs
//! one task per stream kind (and per signal interval for candles). A task
//! dials the feed with a bounded number of attempts, then republishes every
//! frame onto the kind's raw topic, keyed by symbol. A read error or server
//! close ends the task; there is no reconnect after the first dial.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use market_relay_broker::MessageBroker;
use market_relay_core::{StreamKind, StreamsConfig, TopicsConfig};
use market_relay_data::{ErrorLogRecord, ErrorLogStore, ReferenceData};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StreamError;
use crate::source::{FrameSource, FrameStream};
use crate::url::stream_url;

/// Dial retry policy for stream tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for DialPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&StreamsConfig> for DialPolicy {
    fn from(config: &StreamsConfig) -> Self {
        Self {
            attempts: config.dial_attempts.max(1),
            delay: config.dial_delay(),
        }
    }
}

/// One feed to relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub exchange_id: Uuid,
    pub symbol: String,
    pub kind: StreamKind,
    pub interval: Option<String>,
    pub url: String,
    pub topic: String,
}

impl StreamTarget {
    /// `btcusdt@kline_1m` style label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}@{}", self.symbol, self.kind.stream_name(self.interval.as_deref()))
    }
}

/// How a stream task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamExit {
    /// Server closed the connection.
    Closed { frames: u64 },
    ReadFailed { frames: u64, error: String },
    /// Every dial attempt failed.
    GaveUp { attempts: u32, error: String },
}

pub struct StreamSupervisor {
    reference: Arc<dyn ReferenceData>,
    broker: Arc<dyn MessageBroker>,
    source: Arc<dyn FrameSource>,
    error_logs: Arc<dyn ErrorLogStore>,
    topics: TopicsConfig,
    policy: DialPolicy,
    running: Mutex<HashMap<StreamTarget, JoinHandle<StreamExit>>>,
}

impl StreamSupervisor {
    #[must_use]
    pub fn new(
        reference: Arc<dyn ReferenceData>,
        broker: Arc<dyn MessageBroker>,
        source: Arc<dyn FrameSource>,
        error_logs: Arc<dyn ErrorLogStore>,
        topics: TopicsConfig,
    ) -> Self {
        Self {
            reference,
            broker,
            source,
            error_logs,
            topics,
            policy: DialPolicy::default(),
            running: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: DialPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enumerates the feeds `topic` needs for one exchange.
    ///
    /// # Errors
    /// Returns an error if the topic is not a raw topic, the exchange is unknown or
    /// has no streaming URL, or a reference lookup fails.
    pub async fn plan_targets(
        &self,
        exchange_id: Uuid,
        topic: &str,
    ) -> Result<Vec<StreamTarget>, StreamError> {
        let kind = self
            .topics
            .stream_kind(topic)
            .ok_or_else(|| StreamError::NotAStreamTopic(topic.to_string()))?;
        let exchange = self
            .reference
            .exchange(exchange_id)
            .await?
            .ok_or(StreamError::UnknownExchange(exchange_id))?;
        if exchange.ws_url.trim().is_empty() {
            return Err(StreamError::NoStreamingUrl(exchange.name));
        }

        let symbols = self
            .reference
            .symbols_by_exchange(exchange_id)
            .await
            .with_context(|| format!("Failed to list symbols for {}", exchange.name))?;

        let mut targets = Vec::new();
        for symbol in symbols.iter().filter(|s| s.is_live()) {
            let intervals: Vec<Option<String>> = if kind == StreamKind::Candle {
                self.reference
                    .active_intervals(exchange_id, &symbol.symbol)
                    .await?
                    .into_iter()
                    .map(|i| Some(i.interval))
                    .collect()
            } else {
                vec![None]
            };

            for interval in intervals {
                targets.push(StreamTarget {
                    exchange_id,
                    symbol: symbol.symbol.clone(),
                    kind,
                    url: stream_url(&exchange.ws_url, &symbol.symbol, kind, interval.as_deref()),
                    interval,
                    topic: topic.to_string(),
                });
            }
        }
        Ok(targets)
    }

    /// Spawns one task per planned feed that is not already running and returns
    /// without waiting on any of them.
    ///
    /// # Errors
    /// Only planning errors surface; dial failures are handled inside the tasks.
    pub async fn start_all_streams(
        &self,
        exchange_id: Uuid,
        topic: &str,
    ) -> Result<usize, StreamError> {
        let targets = self.plan_targets(exchange_id, topic).await?;
        let mut running = self.running.lock();
        let mut spawned = 0;

        for target in targets {
            if running.get(&target).is_some_and(|h| !h.is_finished()) {
                continue;
            }
            info!(stream = %target.label(), url = %target.url, topic = %target.topic, "starting stream");
            let handle = tokio::spawn(relay_stream(
                target.clone(),
                Arc::clone(&self.broker),
                Arc::clone(&self.source),
                Arc::clone(&self.error_logs),
                self.policy,
            ));
            running.insert(target, handle);
            spawned += 1;
        }
        Ok(spawned)
    }

    /// Starts every enabled topic for every active exchange. Planning failures for
    /// one exchange are logged and do not stop the others.
    ///
    /// # Errors
    /// Returns an error if active exchanges cannot be listed.
    pub async fn start_configured(&self, enabled_topics: &[String]) -> Result<usize> {
        let exchanges = self
            .reference
            .active_exchanges()
            .await
            .context("Failed to list active exchanges")?;

        let mut spawned = 0;
        for exchange in &exchanges {
            for topic in enabled_topics {
                match self.start_all_streams(exchange.id, topic).await {
                    Ok(n) => spawned += n,
                    Err(e) => error!(
                        exchange = %exchange.name,
                        topic = %topic,
                        error = %e,
                        "failed to start streams"
                    ),
                }
            }
        }
        info!(exchanges = exchanges.len(), spawned, "stream supervisor started");
        Ok(spawned)
    }

    /// Number of stream tasks still alive.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.running
            .lock()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Waits for every task started so far and returns how each ended.
    pub async fn join_all(&self) -> Vec<(StreamTarget, StreamExit)> {
        let handles: Vec<(StreamTarget, JoinHandle<StreamExit>)> =
            self.running.lock().drain().collect();
        let mut exits = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            match handle.await {
                Ok(exit) => exits.push((target, exit)),
                Err(e) => warn!(stream = %target.label(), error = %e, "stream task aborted"),
            }
        }
        exits
    }

    /// Aborts every running task.
    pub fn abort_all(&self) {
        for (target, handle) in self.running.lock().drain() {
            if !handle.is_finished() {
                info!(stream = %target.label(), "aborting stream");
            }
            handle.abort();
        }
    }
}

async fn relay_stream(
    target: StreamTarget,
    broker: Arc<dyn MessageBroker>,
    source: Arc<dyn FrameSource>,
    error_logs: Arc<dyn ErrorLogStore>,
    policy: DialPolicy,
) -> StreamExit {
    let label = target.label();

    let mut stream = match dial(&target, source.as_ref(), policy).await {
        Ok(stream) => stream,
        Err(e) => {
            let message = e.to_string();
            error!(
                stream = %label,
                attempts = policy.attempts,
                error = %message,
                "giving up on stream"
            );
            record_failure(error_logs.as_ref(), "Stream dial failed", &label, &message).await;
            return StreamExit::GaveUp {
                attempts: policy.attempts,
                error: message,
            };
        }
    };
    info!(stream = %label, "stream connected");

    let mut frames = 0u64;
    loop {
        match stream.next_frame().await {
            Ok(Some(frame)) => {
                frames += 1;
                if let Err(e) = broker
                    .publish(&target.topic, &target.symbol, frame.as_bytes())
                    .await
                {
                    error!(stream = %label, topic = %target.topic, error = %e, "publish failed");
                }
            }
            Ok(None) => {
                info!(stream = %label, frames, "stream ended");
                return StreamExit::Closed { frames };
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(stream = %label, frames, error = %message, "stream read failed");
                record_failure(error_logs.as_ref(), "Stream read failed", &label, &message).await;
                return StreamExit::ReadFailed {
                    frames,
                    error: message,
                };
            }
        }
    }
}

async fn dial(
    target: &StreamTarget,
    source: &dyn FrameSource,
    policy: DialPolicy,
) -> Result<Box<dyn FrameStream>, StreamError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.connect(&target.url).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt >= policy.attempts => {
                return Err(StreamError::DialExhausted {
                    attempts: attempt,
                    error: format!("{e:#}"),
                })
            }
            Err(e) => {
                warn!(
                    stream = %target.label(),
                    attempt,
                    attempts = policy.attempts,
                    error = %e,
                    "dial failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

async fn record_failure(store: &dyn ErrorLogStore, title: &str, stream: &str, message: &str) {
    let entry = ErrorLogRecord::error(title, format!("{stream}: {message}"), "stream");
    if let Err(e) = store.append_error_log(&entry).await {
        warn!(stream, error = %e, "failed to record stream failure");
    }
}
