//! Supervisor planning and stream task behaviour with a scripted feed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use market_relay_broker::MemoryBroker;
use market_relay_core::{StreamKind, TopicsConfig};
use market_relay_data::{
    ExchangeRecord, MemoryStore, SignalIntervalRecord, SymbolRecord,
};
use market_relay_stream::{
    DialPolicy, FrameSource, FrameStream, StreamError, StreamExit, StreamSupervisor,
};
use parking_lot::Mutex;

#[derive(Default, Clone)]
struct Script {
    dial_failures: u32,
    frames: Vec<Result<String, String>>,
}

/// Feed keyed by URL. Unknown URLs connect and close immediately.
#[derive(Default)]
struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
    dials: Mutex<HashMap<String, u32>>,
}

impl ScriptedSource {
    fn script(&self, url: &str, script: Script) {
        self.scripts.lock().insert(url.to_string(), script);
    }

    fn dials(&self, url: &str) -> u32 {
        self.dials.lock().get(url).copied().unwrap_or(0)
    }
}

struct ScriptedStream {
    frames: VecDeque<Result<String, String>>,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.frames.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameStream>> {
        let attempt = {
            let mut dials = self.dials.lock();
            let count = dials.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let script = self.scripts.lock().get(url).cloned().unwrap_or_default();
        if attempt <= script.dial_failures {
            return Err(anyhow!("connection refused"));
        }
        Ok(Box::new(ScriptedStream {
            frames: script.frames.into(),
        }))
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    broker: MemoryBroker,
    source: Arc<ScriptedSource>,
    exchange: ExchangeRecord,
    supervisor: StreamSupervisor,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let exchange = ExchangeRecord::new(
        "binance",
        "wss://stream.binance.com:443/ws/",
        "https://api.binance.com/api/v3",
    );
    store.add_exchange(exchange.clone());
    store.add_symbol(SymbolRecord::new(exchange.id, "BTCUSDT"));
    store.add_symbol(SymbolRecord::new(exchange.id, "ethusdt"));
    store.add_interval(SignalIntervalRecord::new(exchange.id, "btcusdt", "1m"));
    store.add_interval(SignalIntervalRecord::new(exchange.id, "btcusdt", "1h"));

    let broker = MemoryBroker::single_partition();
    let source = Arc::new(ScriptedSource::default());
    let supervisor = StreamSupervisor::new(
        store.clone(),
        Arc::new(broker.clone()),
        source.clone(),
        store.clone(),
        TopicsConfig::default(),
    )
    .with_policy(DialPolicy {
        attempts: 5,
        delay: Duration::from_secs(5),
    });

    Fixture {
        store,
        broker,
        source,
        exchange,
        supervisor,
    }
}

// ============================================================================
// Planning
// ============================================================================

#[tokio::test]
async fn plans_one_target_per_symbol_and_interval() {
    let f = fixture();
    let topics = TopicsConfig::default();

    let trades = f
        .supervisor
        .plan_targets(f.exchange.id, &topics.raw_trade)
        .await
        .unwrap();
    let mut urls: Vec<&str> = trades.iter().map(|t| t.url.as_str()).collect();
    urls.sort_unstable();
    assert_eq!(
        urls,
        vec![
            "wss://stream.binance.com:443/ws/btcusdt@aggTrade",
            "wss://stream.binance.com:443/ws/ethusdt@aggTrade",
        ]
    );

    let candles = f
        .supervisor
        .plan_targets(f.exchange.id, &topics.raw_candle)
        .await
        .unwrap();
    assert_eq!(candles.len(), 2);
    assert!(candles.iter().all(|t| t.kind == StreamKind::Candle));
    assert!(candles
        .iter()
        .any(|t| t.url.ends_with("btcusdt@kline_1h")));
}

#[tokio::test]
async fn exchange_without_streaming_url_fails_synchronously() {
    let f = fixture();
    let bare = ExchangeRecord::new("bare", "", "https://example.com");
    f.store.add_exchange(bare.clone());

    let err = f
        .supervisor
        .start_all_streams(bare.id, "agg-trade-data")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no streaming URL"), "{err}");

    let unknown_topic = f
        .supervisor
        .start_all_streams(f.exchange.id, "agg-trade-data-pg")
        .await;
    assert!(matches!(unknown_topic, Err(StreamError::NotAStreamTopic(_))));
}

// ============================================================================
// Stream tasks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn frames_are_published_keyed_by_symbol() {
    let f = fixture();
    f.source.script(
        "wss://stream.binance.com:443/ws/btcusdt@depth",
        Script {
            dial_failures: 2,
            frames: vec![Ok("{\"u\":1}".to_string()), Ok("{\"u\":2}".to_string())],
        },
    );

    let spawned = f
        .supervisor
        .start_all_streams(f.exchange.id, "depth-data")
        .await
        .unwrap();
    assert_eq!(spawned, 2);

    let exits = f.supervisor.join_all().await;
    assert_eq!(exits.len(), 2);
    assert_eq!(f.source.dials("wss://stream.binance.com:443/ws/btcusdt@depth"), 3);

    let messages = f.broker.messages("depth-data");
    assert_eq!(
        messages,
        vec![
            ("btcusdt".to_string(), b"{\"u\":1}".to_vec()),
            ("btcusdt".to_string(), b"{\"u\":2}".to_vec()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn dial_gives_up_after_five_attempts_and_logs() {
    let f = fixture();
    let url = "wss://stream.binance.com:443/ws/ethusdt@aggTrade";
    f.source.script(
        url,
        Script {
            dial_failures: u32::MAX,
            frames: Vec::new(),
        },
    );

    f.supervisor
        .start_all_streams(f.exchange.id, "agg-trade-data")
        .await
        .unwrap();
    let exits = f.supervisor.join_all().await;

    let (_, exit) = exits
        .iter()
        .find(|(t, _)| t.symbol == "ethusdt")
        .unwrap();
    assert!(matches!(exit, StreamExit::GaveUp { attempts: 5, .. }));
    assert_eq!(f.source.dials(url), 5);

    let logs = f.store.error_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity, "stream");
    assert!(logs[0].message.contains("ethusdt@aggTrade"));
}

#[tokio::test]
async fn read_error_ends_task_without_reconnect() {
    let f = fixture();
    let url = "wss://stream.binance.com:443/ws/btcusdt@aggTrade";
    f.source.script(
        url,
        Script {
            dial_failures: 0,
            frames: vec![
                Ok("{\"a\":1}".to_string()),
                Err("connection reset".to_string()),
                Ok("{\"a\":2}".to_string()),
            ],
        },
    );

    f.supervisor
        .start_all_streams(f.exchange.id, "agg-trade-data")
        .await
        .unwrap();
    let exits = f.supervisor.join_all().await;

    let (_, exit) = exits.iter().find(|(t, _)| t.symbol == "btcusdt").unwrap();
    assert!(matches!(exit, StreamExit::ReadFailed { frames: 1, .. }));
    assert_eq!(f.source.dials(url), 1);
    assert_eq!(f.broker.len("agg-trade-data"), 1);
}

#[tokio::test]
async fn rerun_only_spawns_targets_not_running() {
    let f = fixture();
    // A feed that never yields keeps its task alive.
    struct Hanging;
    #[async_trait]
    impl FrameStream for Hanging {
        async fn next_frame(&mut self) -> Result<Option<String>> {
            std::future::pending().await
        }
    }
    struct HangingSource;
    #[async_trait]
    impl FrameSource for HangingSource {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FrameStream>> {
            Ok(Box::new(Hanging))
        }
    }

    let supervisor = StreamSupervisor::new(
        f.store.clone(),
        Arc::new(f.broker.clone()),
        Arc::new(HangingSource),
        f.store.clone(),
        TopicsConfig::default(),
    );

    assert_eq!(
        supervisor
            .start_all_streams(f.exchange.id, "candlestick-data")
            .await
            .unwrap(),
        2
    );
    f.store
        .add_interval(SignalIntervalRecord::new(f.exchange.id, "ethusdt", "5m"));
    assert_eq!(
        supervisor
            .start_all_streams(f.exchange.id, "candlestick-data")
            .await
            .unwrap(),
        1
    );
    assert_eq!(supervisor.running_count(), 3);

    supervisor.abort_all();
    assert_eq!(supervisor.running_count(), 0);
}

#[tokio::test]
async fn start_configured_covers_every_active_exchange() {
    let f = fixture();
    let topics = TopicsConfig::default();
    let enabled = vec![topics.raw_trade.clone(), topics.raw_depth.clone()];

    let spawned = f.supervisor.start_configured(&enabled).await.unwrap();
    assert_eq!(spawned, 4);
    f.supervisor.join_all().await;
}
