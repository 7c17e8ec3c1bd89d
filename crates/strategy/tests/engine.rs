//! Signal engine against in-memory stores, cache and history.

use std::sync::Arc;

use market_relay_core::{SignalConfig, SignalDirection};
use market_relay_data::{
    collections, Cache, CandleRecord, ExchangeRecord, MemoryCache, MemoryDocumentStore,
    MemoryHistory, MemoryStore, SignalIntervalRecord, SymbolRecord,
};
use market_relay_strategy::{SignalDeps, SignalEngine, SignalError, SignalOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const BASE_TIME: i64 = 1_700_000_000_000;

fn candle(index: i64, close: Decimal) -> CandleRecord {
    CandleRecord {
        symbol: "btcusdt".to_string(),
        exchange_id: None,
        interval: "1m".to_string(),
        open_time: BASE_TIME + index * 60_000,
        close_time: BASE_TIME + index * 60_000 + 59_999,
        open: close,
        high: close,
        low: close,
        close,
        volume: dec!(1),
        quote_volume: close,
        trade_count: 1,
        taker_buy_base_volume: dec!(0.5),
        taker_buy_quote_volume: close / dec!(2),
    }
}

/// 150 bars at 100 followed by 50 bars at 200.
fn rising_history() -> Vec<CandleRecord> {
    (0..200)
        .map(|i| candle(i, if i < 150 { dec!(100) } else { dec!(200) }))
        .collect()
}

struct Fixture {
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    documents: Arc<MemoryDocumentStore>,
    history: Arc<MemoryHistory>,
    engine: SignalEngine,
}

fn fixture(history: MemoryHistory) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let exchange = ExchangeRecord::new(
        "binance",
        "wss://stream.binance.com:443/ws",
        "https://api.binance.com/api/v3",
    );
    store.add_symbol(SymbolRecord::new(exchange.id, "btcusdt"));
    store.add_interval(SignalIntervalRecord::new(exchange.id, "btcusdt", "1m"));
    store.add_exchange(exchange);

    let cache = Arc::new(MemoryCache::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let history = Arc::new(history);
    let deps = SignalDeps {
        reference: store.clone(),
        candles: store.clone(),
        signals: store.clone(),
        error_logs: store.clone(),
        documents: documents.clone(),
        cache: cache.clone(),
        history: history.clone(),
    };

    Fixture {
        engine: SignalEngine::new(deps, SignalConfig::default()),
        store,
        cache,
        documents,
        history,
    }
}

async fn preset_windows(cache: &MemoryCache, fast: &str, slow: &str) {
    let fast_values = vec![fast.to_string(); 50];
    let slow_values = vec![slow.to_string(); 200];
    cache.list_replace("btcusdt:1m:ma50", &fast_values, 50).await.unwrap();
    cache.list_replace("btcusdt:1m:ma200", &slow_values, 200).await.unwrap();
}

// ============================================================================
// Crossover and hysteresis
// ============================================================================

#[tokio::test]
async fn fast_above_slow_emits_buy() {
    let f = fixture(MemoryHistory::default());
    preset_windows(&f.cache, "200.0", "100.0").await;

    let outcome = f.engine.evaluate("btcusdt", "1m").await.unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::Emitted {
            direction: SignalDirection::Buy,
            ma50: "200".to_string(),
            ma200: "100".to_string(),
        }
    );

    let signals = f.store.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal, "buy");
    assert_eq!(signals[0].timeframe, "1m");
    assert_eq!(signals[0].indicator["MA50"], "200");
    assert_eq!(signals[0].indicator["MA200"], "100");
    assert_eq!(
        f.cache.get("btcusdt:1m:lastSignal").await.unwrap().as_deref(),
        Some("BUY")
    );
    assert_eq!(f.documents.documents(collections::SIGNALS).len(), 1);
}

#[tokio::test]
async fn fast_below_slow_emits_sell() {
    let f = fixture(MemoryHistory::default());
    preset_windows(&f.cache, "100.0", "200.0").await;

    let outcome = f.engine.evaluate("btcusdt", "1m").await.unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::Emitted {
            direction: SignalDirection::Sell,
            ma50: "100".to_string(),
            ma200: "200".to_string(),
        }
    );
    assert_eq!(f.store.signals()[0].signal, "sell");
}

#[tokio::test]
async fn repeated_direction_is_suppressed() {
    let f = fixture(MemoryHistory::default());
    preset_windows(&f.cache, "200", "100").await;

    f.engine.evaluate("btcusdt", "1m").await.unwrap();
    let repeat = f.engine.evaluate("btcusdt", "1m").await.unwrap();
    assert_eq!(
        repeat,
        SignalOutcome::Suppressed {
            direction: SignalDirection::Buy
        }
    );
    assert_eq!(f.store.signals().len(), 1);

    preset_windows(&f.cache, "90", "100").await;
    let flipped = f.engine.evaluate("btcusdt", "1m").await.unwrap();
    assert!(matches!(
        flipped,
        SignalOutcome::Emitted {
            direction: SignalDirection::Sell,
            ..
        }
    ));
    assert_eq!(f.store.signals().len(), 2);
}

#[tokio::test]
async fn equal_averages_emit_nothing() {
    let f = fixture(MemoryHistory::default());
    preset_windows(&f.cache, "150", "150.00").await;

    let outcome = f.engine.evaluate("btcusdt", "1m").await.unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::Neutral {
            ma: "150".to_string()
        }
    );
    assert!(f.store.signals().is_empty());
    assert!(f.cache.get("btcusdt:1m:lastSignal").await.unwrap().is_none());
}

// ============================================================================
// Cold start
// ============================================================================

#[tokio::test]
async fn cold_start_backfills_from_history_and_emits() {
    let f = fixture(MemoryHistory::with_candles(rising_history()));

    let outcome = f
        .engine
        .on_closed_candle(&candle(200, dec!(200)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SignalOutcome::Emitted {
            direction: SignalDirection::Buy,
            ma50: "200".to_string(),
            ma200: "125".to_string(),
        }
    );
    assert_eq!(f.history.calls(), 1);
    assert_eq!(f.store.candles().len(), 200);
    assert_eq!(f.documents.documents(collections::CANDLESTICKS).len(), 200);

    let slow = f.cache.list_all("btcusdt:1m:ma200").await.unwrap();
    assert_eq!(slow.len(), 200);
    assert_eq!(slow.first().map(String::as_str), Some("100"));
    assert_eq!(slow.last().map(String::as_str), Some("200"));
}

#[tokio::test]
async fn backfill_skips_candles_already_stored() {
    let f = fixture(MemoryHistory::with_candles(rising_history()));
    for c in rising_history().into_iter().take(120) {
        use market_relay_data::CandleStore;
        f.store.insert_candle(&c).await.unwrap();
    }

    f.engine
        .on_closed_candle(&candle(200, dec!(200)))
        .await
        .unwrap();

    assert_eq!(f.store.candles().len(), 200);
    assert_eq!(f.documents.documents(collections::CANDLESTICKS).len(), 80);
}

#[tokio::test]
async fn fewer_than_fifty_closes_yields_no_audit_row() {
    let f = fixture(MemoryHistory::with_candles(
        (0..30).map(|i| candle(i, dec!(100))).collect(),
    ));

    let outcome = f
        .engine
        .on_closed_candle(&candle(30, dec!(101)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SignalOutcome::InsufficientData {
            fast_len: 30,
            slow_len: 30
        }
    );
    assert!(f.store.signals().is_empty());
}

#[tokio::test]
async fn exhausted_backfill_without_stored_candles_errors() {
    let f = fixture(MemoryHistory::unavailable());

    let err = f
        .engine
        .on_closed_candle(&candle(0, dec!(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::BackfillExhausted { .. }));
    let logs = f.store.error_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity, "signal");
    assert!(!f.cache.exists("btcusdt:1m:ma50").await.unwrap());
}

#[tokio::test]
async fn failed_backfill_falls_back_to_stored_candles() {
    let f = fixture(MemoryHistory::unavailable());
    for i in 0..60 {
        use market_relay_data::CandleStore;
        f.store.insert_candle(&candle(i, dec!(10))).await.unwrap();
    }

    let outcome = f
        .engine
        .on_closed_candle(&candle(60, dec!(10)))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SignalOutcome::InsufficientData {
            fast_len: 50,
            slow_len: 60
        }
    );
    assert!(f.store.error_logs().is_empty());
}

#[tokio::test]
async fn stale_slow_window_is_discarded_on_cold_start() {
    let f = fixture(MemoryHistory::with_candles(rising_history()));
    f.cache
        .list_replace("btcusdt:1m:ma200", &["not-a-number".to_string()], 200)
        .await
        .unwrap();

    let outcome = f
        .engine
        .on_closed_candle(&candle(200, dec!(200)))
        .await
        .unwrap();
    assert!(matches!(outcome, SignalOutcome::Emitted { .. }));
}

// ============================================================================
// Warm path
// ============================================================================

#[tokio::test]
async fn warm_windows_roll_fifo() {
    let f = fixture(MemoryHistory::with_candles(rising_history()));
    f.engine
        .on_closed_candle(&candle(200, dec!(200)))
        .await
        .unwrap();

    let outcome = f
        .engine
        .on_closed_candle(&candle(201, dec!(300)))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::Suppressed {
            direction: SignalDirection::Buy
        }
    );

    let fast = f.cache.list_all("btcusdt:1m:ma50").await.unwrap();
    let slow = f.cache.list_all("btcusdt:1m:ma200").await.unwrap();
    assert_eq!(fast.len(), 50);
    assert_eq!(slow.len(), 200);
    assert_eq!(fast.last().map(String::as_str), Some("300"));
    assert_eq!(f.history.calls(), 1);
}

#[tokio::test]
async fn untracked_interval_is_dropped() {
    let f = fixture(MemoryHistory::with_candles(rising_history()));
    let mut hourly = candle(0, dec!(1));
    hourly.interval = "1h".to_string();

    let outcome = f.engine.on_closed_candle(&hourly).await.unwrap();
    assert_eq!(outcome, SignalOutcome::NoInterval);
    assert_eq!(f.history.calls(), 0);
}
