//! Order book reconciliation against in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;

use market_relay_broker::{BrokerMessage, MessageHandler};
use market_relay_core::BookSide;
use market_relay_data::{
    collections, Cache, ExchangeRecord, MemoryCache, MemoryDocumentStore, MemoryStore,
    SymbolRecord,
};
use market_relay_pipeline::{DepthFrame, OrderBookReconciler, ReconcileReport};
use serde_json::json;

struct Fixture {
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    documents: Arc<MemoryDocumentStore>,
    reconciler: OrderBookReconciler,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let exchange = ExchangeRecord::new(
        "binance",
        "wss://stream.binance.com:443/ws",
        "https://api.binance.com/api/v3",
    );
    store.add_symbol(SymbolRecord::new(exchange.id, "btcusdt"));
    store.add_exchange(exchange);

    let cache = Arc::new(MemoryCache::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let reconciler =
        OrderBookReconciler::new(cache.clone(), store.clone(), documents.clone(), store.clone());
    Fixture {
        store,
        cache,
        documents,
        reconciler,
    }
}

fn frame(value: serde_json::Value) -> DepthFrame {
    serde_json::from_value(value).unwrap()
}

fn bids(levels: serde_json::Value) -> DepthFrame {
    frame(json!({"e": "depthUpdate", "s": "BTCUSDT", "b": levels, "a": []}))
}

async fn cached(cache: &MemoryCache, side: &str) -> HashMap<String, String> {
    cache
        .hash_get_all(&format!("orderbook:btcusdt:{side}"))
        .await
        .unwrap()
}

// ============================================================================
// Snapshot diffing
// ============================================================================

#[tokio::test]
async fn new_level_alongside_existing_upserts_both_without_closing() {
    let f = fixture();
    f.reconciler
        .apply(&bids(json!([["48000.00", "1.0"]])), "btcusdt")
        .await
        .unwrap();

    let report = f
        .reconciler
        .apply(&bids(json!([["48000.00", "1.0"], ["49000.00", "2.0"]])), "btcusdt")
        .await
        .unwrap();

    assert_eq!(
        report,
        ReconcileReport {
            closed: 0,
            upserted: 2,
            failed: 0
        }
    );
    assert_eq!(f.store.open_levels("btcusdt", BookSide::Bid).len(), 2);
}

#[tokio::test]
async fn zero_amount_closes_without_upsert() {
    let f = fixture();
    f.reconciler
        .apply(&bids(json!([[48000.00, 1.0]])), "btcusdt")
        .await
        .unwrap();

    let report = f
        .reconciler
        .apply(&bids(json!([[48000.00, 0.0]])), "btcusdt")
        .await
        .unwrap();

    assert_eq!(
        report,
        ReconcileReport {
            closed: 1,
            upserted: 0,
            failed: 0
        }
    );
    assert!(f.store.open_levels("btcusdt", BookSide::Bid).is_empty());
}

#[tokio::test]
async fn sentinel_zero_closes_level_in_place() {
    let f = fixture();
    f.reconciler
        .apply(&bids(json!([["48000.00", "1.0"]])), "btcusdt")
        .await
        .unwrap();

    let report = f
        .reconciler
        .apply(&bids(json!([["48000.00", "0.00000000"]])), "btcusdt")
        .await
        .unwrap();

    assert_eq!(report.closed, 1);
    assert_eq!(report.upserted, 0);
    let levels = f.store.levels();
    assert_eq!(levels.len(), 1, "close must not add a row");
    assert_eq!(levels[0].status, "closed");

    let doc = f
        .documents
        .keyed(collections::ORDER_BOOK_LEVELS, "btcusdt:bid:48000.00")
        .unwrap();
    assert_eq!(doc["status"], "closed");
}

#[tokio::test]
async fn absent_prices_are_closed_once_per_frame() {
    let f = fixture();
    f.reconciler
        .apply(
            &bids(json!([["100.0", "1"], ["101.0", "1"], ["102.0", "1"]])),
            "btcusdt",
        )
        .await
        .unwrap();

    let report = f
        .reconciler
        .apply(&bids(json!([["101.0", "3"]])), "btcusdt")
        .await
        .unwrap();

    assert_eq!(report.closed, 2);
    assert_eq!(report.upserted, 1);
    assert_eq!(f.store.close_calls(), 2);

    let open = f.store.open_levels("btcusdt", BookSide::Bid);
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].price, "101.0");
    assert_eq!(open[0].amount, "3");
}

#[tokio::test]
async fn cached_snapshot_equals_last_frame() {
    let f = fixture();
    f.reconciler
        .apply(
            &frame(json!({
                "s": "BTCUSDT",
                "b": [["1.0", "5"], ["2.0", "6"]],
                "a": [["3.0", "7"]]
            })),
            "btcusdt",
        )
        .await
        .unwrap();
    f.reconciler
        .apply(
            &frame(json!({"s": "BTCUSDT", "b": [["2.0", "9"]], "a": []})),
            "btcusdt",
        )
        .await
        .unwrap();

    let bid_snapshot = cached(&f.cache, "bid").await;
    assert_eq!(
        bid_snapshot,
        HashMap::from([("2.0".to_string(), "9".to_string())])
    );
    assert!(cached(&f.cache, "ask").await.is_empty());
    assert!(f.store.open_levels("btcusdt", BookSide::Ask).is_empty());
}

// ============================================================================
// Redelivery and failures
// ============================================================================

#[tokio::test]
async fn redelivered_frame_creates_no_duplicate_open_rows() {
    let f = fixture();
    let payload = json!({
        "e": "depthUpdate", "s": "BTCUSDT",
        "b": [["48000.00", "1.0"]], "a": [["48010.00", "2.0"]]
    })
    .to_string();
    let message = BrokerMessage {
        topic: "depth-data".to_string(),
        partition: 0,
        offset: "0".to_string(),
        key: "btcusdt".to_string(),
        value: payload.into_bytes(),
    };

    f.reconciler.handle(&message).await.unwrap();
    f.reconciler.handle(&message).await.unwrap();

    assert_eq!(f.store.levels().len(), 2);
    assert_eq!(f.store.open_levels("btcusdt", BookSide::Bid).len(), 1);
    assert_eq!(f.store.open_levels("btcusdt", BookSide::Ask).len(), 1);
    assert_eq!(f.documents.documents(collections::ORDER_BOOK_LEVELS).len(), 2);
}

#[tokio::test]
async fn envelope_payload_is_accepted() {
    let f = fixture();
    let payload = json!({
        "document_id": "doc-9",
        "value": {"s": "BTCUSDT", "b": [["10.0", "1"]], "a": []}
    })
    .to_string();
    let message = BrokerMessage {
        topic: "depth-data-pg".to_string(),
        partition: 0,
        offset: "4".to_string(),
        key: "btcusdt".to_string(),
        value: payload.into_bytes(),
    };

    f.reconciler.handle(&message).await.unwrap();
    assert_eq!(f.store.open_levels("btcusdt", BookSide::Bid).len(), 1);
}

#[tokio::test]
async fn one_failing_price_does_not_abort_the_frame() {
    let f = fixture();
    f.store.fail_on_price("50.0");

    let report = f
        .reconciler
        .apply(
            &bids(json!([["49.0", "1"], ["50.0", "1"], ["51.0", "1"]])),
            "btcusdt",
        )
        .await
        .unwrap();

    assert_eq!(report.upserted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(f.store.open_levels("btcusdt", BookSide::Bid).len(), 2);
}

#[tokio::test]
async fn unregistered_symbol_is_rejected() {
    let f = fixture();
    let err = f
        .reconciler
        .apply(
            &frame(json!({"s": "DOGEUSDT", "b": [["0.1", "100"]], "a": []})),
            "dogeusdt",
        )
        .await
        .unwrap_err();

    assert!(err.to_string().contains("dogeusdt"));
    assert!(f.store.levels().is_empty());
}
