//! Consumer group runtime.
//!
//! A [`ConsumerGroup`] binds one handler to one (topic, group) pair and drives
//! it: read, handle, commit, repeat. Offsets are committed after the handler
//! returns whether it succeeded or not, so a poison message never wedges the
//! group. [`CommitPolicy::RetryThenCommit`] gives transient failures a few more
//! tries first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::BrokerError;
use crate::message::{BrokerMessage, MessageBroker};

/// Processes one message for a consumer group.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &BrokerMessage) -> anyhow::Result<()>;
}

/// When a group's offset moves past a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Commit once the handler returns, success or failure.
    #[default]
    AfterHandler,
    /// Retry a failing handler up to `max_attempts` total, then commit anyway.
    RetryThenCommit { max_attempts: u32, backoff: Duration },
}

impl CommitPolicy {
    fn max_attempts(&self) -> u32 {
        match self {
            Self::AfterHandler => 1,
            Self::RetryThenCommit { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    fn backoff(&self) -> Duration {
        match self {
            Self::AfterHandler => Duration::ZERO,
            Self::RetryThenCommit { backoff, .. } => *backoff,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub handled: u64,
    pub failed: u64,
    pub committed: u64,
}

pub struct ConsumerGroup {
    topic: String,
    group: String,
    handler: Arc<dyn MessageHandler>,
    policy: CommitPolicy,
}

impl ConsumerGroup {
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        group: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            handler,
            policy: CommitPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CommitPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Consumes until the broker closes or `shutdown` flips to `true`.
    ///
    /// Shutdown is checked between messages, never in the middle of one.
    ///
    /// # Errors
    /// Returns an error if the subscription cannot be opened or a read fails.
    pub async fn run(
        &self,
        broker: Arc<dyn MessageBroker>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerStats, BrokerError> {
        let mut subscription = broker.subscribe(&self.topic, &self.group).await?;
        info!(topic = %self.topic, group = %self.group, "consumer group started");

        let mut stats = ConsumerStats::default();
        loop {
            if *shutdown.borrow() {
                info!(topic = %self.topic, group = %self.group, "shutdown requested");
                break;
            }

            let Some(message) = subscription.next().await? else {
                info!(topic = %self.topic, group = %self.group, "broker closed");
                break;
            };
            stats.received += 1;

            if self.dispatch(&message).await {
                stats.handled += 1;
            } else {
                stats.failed += 1;
            }

            match subscription.commit(&message).await {
                Ok(()) => stats.committed += 1,
                Err(e) => warn!(
                    topic = %self.topic,
                    group = %self.group,
                    offset = %message.offset,
                    error = %e,
                    "commit failed, message may be redelivered"
                ),
            }
        }

        info!(
            topic = %self.topic,
            group = %self.group,
            received = stats.received,
            handled = stats.handled,
            failed = stats.failed,
            "consumer group stopped"
        );
        Ok(stats)
    }

    /// Runs the group on its own task.
    pub fn spawn(
        self,
        broker: Arc<dyn MessageBroker>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<ConsumerStats, BrokerError>> {
        tokio::spawn(async move { self.run(broker, shutdown).await })
    }

    /// Returns whether the handler eventually succeeded.
    async fn dispatch(&self, message: &BrokerMessage) -> bool {
        let max_attempts = self.policy.max_attempts();
        for attempt in 1..=max_attempts {
            match self.handler.handle(message).await {
                Ok(()) => {
                    debug!(
                        topic = %self.topic,
                        group = %self.group,
                        offset = %message.offset,
                        "handled"
                    );
                    return true;
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        topic = %self.topic,
                        group = %self.group,
                        offset = %message.offset,
                        attempt,
                        error = %e,
                        "handler failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff()).await;
                }
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        group = %self.group,
                        key = %message.key,
                        offset = %message.offset,
                        error = %e,
                        "handler failed, committing past message"
                    );
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_tries_once() {
        let policy = CommitPolicy::default();
        assert_eq!(policy, CommitPolicy::AfterHandler);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff(), Duration::ZERO);
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let policy = CommitPolicy::RetryThenCommit {
            max_attempts: 0,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.backoff(), Duration::from_millis(10));
    }
}
