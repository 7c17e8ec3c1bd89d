//! Candle repository.
//!
//! Closed candles are written once per bar by the relational candle writer and
//! by the signal engine's cold-start backfill. Both paths may see the same bar
//! more than once, so every insert is deduplicated on (symbol, interval, open_time).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::CandleRecord;
use crate::store::CandleStore;

/// Repository for closed candle operations.
#[derive(Debug, Clone)]
pub struct CandleRepository {
    pool: PgPool,
}

impl CandleRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn insert_query(
    record: &CandleRecord,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO candlesticks
            (symbol, exchange_id, interval, open_time, close_time,
             open, high, low, close, volume, quote_volume, trade_count,
             taker_buy_base_volume, taker_buy_quote_volume)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (symbol, interval, open_time) DO NOTHING
        "#,
    )
    .bind(&record.symbol)
    .bind(record.exchange_id)
    .bind(&record.interval)
    .bind(record.open_time)
    .bind(record.close_time)
    .bind(record.open)
    .bind(record.high)
    .bind(record.low)
    .bind(record.close)
    .bind(record.volume)
    .bind(record.quote_volume)
    .bind(record.trade_count)
    .bind(record.taker_buy_base_volume)
    .bind(record.taker_buy_quote_volume)
}

#[async_trait]
impl CandleStore for CandleRepository {
    async fn candle_exists(&self, symbol: &str, interval: &str, open_time: i64) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM candlesticks
                WHERE symbol = $1 AND interval = $2 AND open_time = $3
            )
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .bind(open_time)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check candle existence")?;

        Ok(exists.0)
    }

    async fn insert_candle(&self, candle: &CandleRecord) -> Result<bool> {
        let result = insert_query(candle)
            .execute(&self.pool)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert candle {}/{} at {}",
                    candle.symbol, candle.interval, candle.open_time
                )
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<CandleRecord>> {
        sqlx::query_as::<_, CandleRecord>(
            r#"
            SELECT symbol, exchange_id, interval, open_time, close_time,
                   open, high, low, close, volume, quote_volume, trade_count,
                   taker_buy_base_volume, taker_buy_quote_volume
            FROM candlesticks
            WHERE symbol = $1 AND interval = $2
            ORDER BY open_time DESC
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent candles")
    }
}
