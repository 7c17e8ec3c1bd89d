//! Process wiring for the `market-relay` binary.
//!
//! [`RelayServices`] holds every client the relay needs behind its seam, so
//! the same consumer groups and supervisor run against Postgres and Redis in
//! production and against the in-memory stores in tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use market_relay_broker::{BrokerError, ConsumerGroup, ConsumerStats, MessageBroker};
use market_relay_core::AppConfig;
use market_relay_data::{
    Cache, CandleStore, DatabaseClient, DocumentStore, ErrorLogStore, HistoricalCandles,
    OrderBookStore, PgDocumentStore, RedisCache, ReferenceData, SignalStore, TradeStore,
};
use market_relay_pipeline::{CandleWriter, DocumentWriter, OrderBookReconciler, TradeWriter};
use market_relay_stream::{BinanceKlineClient, DialPolicy, FrameSource, StreamSupervisor};
use market_relay_strategy::{SignalDeps, SignalEngine, SignalHandler};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Every collaborator of the relay, already connected.
#[derive(Clone)]
pub struct RelayServices {
    pub reference: Arc<dyn ReferenceData>,
    pub candles: Arc<dyn CandleStore>,
    pub orderbook: Arc<dyn OrderBookStore>,
    pub trades: Arc<dyn TradeStore>,
    pub signals: Arc<dyn SignalStore>,
    pub error_logs: Arc<dyn ErrorLogStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn Cache>,
    pub history: Arc<dyn HistoricalCandles>,
    pub broker: Arc<dyn MessageBroker>,
}

impl RelayServices {
    /// Connects Postgres, the Redis cache, the broker and the klines client.
    ///
    /// # Errors
    /// Returns an error if any backing service is unreachable.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = DatabaseClient::connect(&config.database).await?;
        let repos = db.repositories();
        let cache = RedisCache::connect(&config.redis.url)
            .await
            .context("Failed to connect cache")?;
        let broker = market_relay_broker::connect(&config.redis.url, &config.broker)
            .await
            .context("Failed to connect broker")?;
        let history = BinanceKlineClient::new(&config.signals)?;

        info!(broker = ?config.broker.kind, "relay services connected");
        Ok(Self {
            reference: Arc::new(repos.reference),
            candles: Arc::new(repos.candles),
            orderbook: Arc::new(repos.orderbook),
            trades: Arc::new(repos.price_ticks),
            signals: Arc::new(repos.signals),
            error_logs: Arc::new(repos.error_logs),
            documents: Arc::new(PgDocumentStore::new(db.pool().clone())),
            cache: Arc::new(cache),
            history: Arc::new(history),
            broker,
        })
    }

    /// Builds the stream supervisor over `source`.
    #[must_use]
    pub fn supervisor(&self, config: &AppConfig, source: Arc<dyn FrameSource>) -> StreamSupervisor {
        StreamSupervisor::new(
            Arc::clone(&self.reference),
            Arc::clone(&self.broker),
            source,
            Arc::clone(&self.error_logs),
            config.topics.clone(),
        )
        .with_policy(DialPolicy::from(&config.streams))
    }

    /// The seven consumer groups: three document writers, the trade writer, the
    /// order book reconciler, the candle writer and the signal engine.
    #[must_use]
    pub fn consumer_groups(&self, config: &AppConfig) -> Vec<ConsumerGroup> {
        let topics = &config.topics;
        let groups = &config.groups;

        let engine = Arc::new(SignalEngine::new(
            SignalDeps {
                reference: Arc::clone(&self.reference),
                candles: Arc::clone(&self.candles),
                signals: Arc::clone(&self.signals),
                error_logs: Arc::clone(&self.error_logs),
                documents: Arc::clone(&self.documents),
                cache: Arc::clone(&self.cache),
                history: Arc::clone(&self.history),
            },
            config.signals.clone(),
        ));

        vec![
            ConsumerGroup::new(
                &topics.raw_trade,
                &groups.trade_documents,
                Arc::new(DocumentWriter::trades(
                    Arc::clone(&self.documents),
                    Arc::clone(&self.broker),
                    topics,
                )),
            ),
            ConsumerGroup::new(
                &topics.raw_depth,
                &groups.depth_documents,
                Arc::new(DocumentWriter::depth(
                    Arc::clone(&self.documents),
                    Arc::clone(&self.broker),
                    topics,
                )),
            ),
            ConsumerGroup::new(
                &topics.raw_candle,
                &groups.candle_documents,
                Arc::new(DocumentWriter::candles(
                    Arc::clone(&self.documents),
                    Arc::clone(&self.broker),
                )),
            ),
            ConsumerGroup::new(
                &topics.relational_trade,
                &groups.trade_relational,
                Arc::new(TradeWriter::new(Arc::clone(&self.trades))),
            ),
            ConsumerGroup::new(
                &topics.relational_depth,
                &groups.depth_relational,
                Arc::new(OrderBookReconciler::new(
                    Arc::clone(&self.cache),
                    Arc::clone(&self.orderbook),
                    Arc::clone(&self.documents),
                    Arc::clone(&self.reference),
                )),
            ),
            ConsumerGroup::new(
                &topics.raw_candle,
                &groups.candle_relational,
                Arc::new(CandleWriter::new(
                    Arc::clone(&self.candles),
                    Arc::clone(&self.reference),
                )),
            ),
            ConsumerGroup::new(
                &topics.raw_candle,
                &groups.candle_signals,
                Arc::new(SignalHandler::new(engine)),
            ),
        ]
    }

    /// Spawns every consumer group on its own task.
    #[must_use]
    pub fn spawn_consumers(
        &self,
        config: &AppConfig,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<Result<ConsumerStats, BrokerError>>> {
        self.consumer_groups(config)
            .into_iter()
            .map(|group| group.spawn(Arc::clone(&self.broker), shutdown.clone()))
            .collect()
    }
}

/// Waits for every consumer task, logging the ones that failed.
pub async fn join_consumers(handles: Vec<JoinHandle<Result<ConsumerStats, BrokerError>>>) -> ConsumerStats {
    let mut total = ConsumerStats::default();
    for handle in handles {
        match handle.await {
            Ok(Ok(stats)) => {
                total.received += stats.received;
                total.handled += stats.handled;
                total.failed += stats.failed;
                total.committed += stats.committed;
            }
            Ok(Err(e)) => error!(error = %e, "consumer group stopped with error"),
            Err(e) => error!(error = %e, "consumer task panicked"),
        }
    }
    total
}
