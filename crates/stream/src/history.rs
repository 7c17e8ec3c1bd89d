//! Historical klines client for cold-start backfill.
//!
//! Calls `{rest_url}/klines?symbol=BTCUSDT&interval=1m&limit=200` on the
//! exchange's REST base, rate limited, with a bounded number of retries.

use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use market_relay_core::{normalize_symbol, SignalConfig};
use market_relay_data::{CandleRecord, ExchangeRecord, HistoricalCandles};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

pub struct BinanceKlineClient {
    client: reqwest::Client,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    attempts: u32,
    retry_delay: Duration,
}

impl BinanceKlineClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SignalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limit_per_second).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            attempts: config.history_attempts.max(1),
            retry_delay: Duration::from_millis(config.history_retry_delay_ms),
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        exchange: &ExchangeRecord,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("symbol", symbol.to_uppercase().as_str()),
                ("interval", interval),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .context("Failed to send klines request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Klines API error ({}): {}", status, error_text));
        }

        let rows: Vec<Vec<JsonValue>> = response
            .json()
            .await
            .context("Failed to parse klines response")?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let symbol = normalize_symbol(symbol);
        Ok(rows
            .iter()
            .filter_map(|row| parse_kline(row, &symbol, interval, Some(exchange.id)))
            // the newest row is usually the bar still forming
            .filter(|candle| candle.close_time < now_ms)
            .collect())
    }
}

#[async_trait]
impl HistoricalCandles for BinanceKlineClient {
    async fn fetch_candles(
        &self,
        exchange: &ExchangeRecord,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>> {
        let url = format!("{}/klines", exchange.rest_url.trim_end_matches('/'));
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            self.rate_limiter.until_ready().await;
            match self.fetch_once(&url, exchange, symbol, interval, limit).await {
                Ok(candles) => {
                    tracing::debug!(symbol, interval, count = candles.len(), "fetched klines");
                    return Ok(candles);
                }
                Err(e) => {
                    tracing::warn!(
                        symbol,
                        interval,
                        attempt,
                        attempts = self.attempts,
                        error = %e,
                        "klines fetch failed"
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(anyhow!(
            "Klines for {symbol} {interval} unavailable after {} attempts: {}",
            self.attempts,
            last_error.map_or_else(|| "no attempt made".to_string(), |e| format!("{e:#}"))
        ))
    }
}

/// Parses one kline row:
///
/// ```text
/// [openTime, open, high, low, close, volume, closeTime,
///  quoteVolume, trades, takerBuyBase, takerBuyQuote, ignore]
/// ```
fn parse_kline(
    row: &[JsonValue],
    symbol: &str,
    interval: &str,
    exchange_id: Option<uuid::Uuid>,
) -> Option<CandleRecord> {
    if row.len() < 11 {
        return None;
    }

    Some(CandleRecord {
        symbol: symbol.to_string(),
        exchange_id,
        interval: interval.to_string(),
        open_time: row[0].as_i64()?,
        close_time: row[6].as_i64()?,
        open: decimal(&row[1])?,
        high: decimal(&row[2])?,
        low: decimal(&row[3])?,
        close: decimal(&row[4])?,
        volume: decimal(&row[5])?,
        quote_volume: decimal(&row[7])?,
        trade_count: row[8].as_i64()?,
        taker_buy_base_volume: decimal(&row[9])?,
        taker_buy_quote_volume: decimal(&row[10])?,
    })
}

/// Binance sends decimals as strings; accept bare numbers too.
fn decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::String(s) => Decimal::from_str(s).ok(),
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}
