//! Klines client against a mocked REST endpoint.

use market_relay_core::SignalConfig;
use market_relay_data::{ExchangeRecord, HistoricalCandles};
use market_relay_stream::BinanceKlineClient;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> SignalConfig {
    SignalConfig {
        history_attempts: 3,
        history_retry_delay_ms: 0,
        rate_limit_per_second: 100,
        ..SignalConfig::default()
    }
}

fn kline(open_time: i64, close: &str) -> serde_json::Value {
    json!([
        open_time, "100.0", "110.0", "90.0", close, "5.0",
        open_time + 59_999, "500.0", 12, "2.5", "250.0", "0"
    ])
}

fn exchange_for(server: &MockServer) -> ExchangeRecord {
    ExchangeRecord::new(
        "binance",
        "wss://stream.binance.com:443/ws",
        format!("{}/api/v3", server.uri()),
    )
}

#[tokio::test]
async fn fetches_klines_with_uppercase_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline(1_700_000_000_000, "101.5"),
            kline(1_700_000_060_000, "102.5"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = BinanceKlineClient::new(&fast_config()).unwrap();
    let exchange = exchange_for(&server);
    let candles = client
        .fetch_candles(&exchange, "btcusdt", "1m", 200)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].symbol, "btcusdt");
    assert_eq!(candles[0].exchange_id, Some(exchange.id));
    assert_eq!(candles[0].open_time, 1_700_000_000_000);
    assert_eq!(candles[1].close, dec!(102.5));
    assert_eq!(candles[1].trade_count, 12);
}

#[tokio::test]
async fn retries_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([kline(1_700_000_000_000, "99")])),
        )
        .mount(&server)
        .await;

    let client = BinanceKlineClient::new(&fast_config()).unwrap();
    let candles = client
        .fetch_candles(&exchange_for(&server), "ETHUSDT", "1m", 10)
        .await
        .unwrap();

    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].symbol, "ethusdt");
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(3)
        .mount(&server)
        .await;

    let client = BinanceKlineClient::new(&fast_config()).unwrap();
    let err = client
        .fetch_candles(&exchange_for(&server), "btcusdt", "1h", 200)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("after 3 attempts"), "{err}");
}

#[tokio::test]
async fn still_forming_bar_is_dropped() {
    let server = MockServer::start().await;
    let now = chrono::Utc::now().timestamp_millis();
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            kline(1_700_000_000_000, "1"),
            kline(now - 1_000, "2"),
        ])))
        .mount(&server)
        .await;

    let client = BinanceKlineClient::new(&fast_config()).unwrap();
    let candles = client
        .fetch_candles(&exchange_for(&server), "btcusdt", "1m", 2)
        .await
        .unwrap();

    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].open_time, 1_700_000_000_000);
}
