//! Signal audit trail repository. Append-only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::SignalRecord;
use crate::store::SignalStore;

#[derive(Debug, Clone)]
pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent signals for a (symbol, timeframe) pair, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: i64,
    ) -> Result<Vec<SignalRecord>> {
        sqlx::query_as::<_, SignalRecord>(
            r#"
            SELECT id, symbol, timeframe, signal, indicator, last_trade, created_at
            FROM signals
            WHERE symbol = $1 AND timeframe = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query signals")
    }
}

#[async_trait]
impl SignalStore for SignalRepository {
    async fn append_signal(&self, signal: &SignalRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals (id, symbol, timeframe, signal, indicator, last_trade, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(signal.id)
        .bind(&signal.symbol)
        .bind(&signal.timeframe)
        .bind(&signal.signal)
        .bind(&signal.indicator)
        .bind(&signal.last_trade)
        .bind(signal.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert signal")?;

        Ok(())
    }
}
