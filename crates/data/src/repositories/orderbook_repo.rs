//! Order book level repository.
//!
//! Levels are mutated in place: an upsert refreshes the single open row for
//! (symbol, price, side) and a close flips it to `closed`. Closed rows are kept.

use anyhow::{Context, Result};
use async_trait::async_trait;
use market_relay_core::{BookSide, LevelStatus};
use sqlx::PgPool;

use crate::models::OrderBookLevelRecord;
use crate::store::OrderBookStore;

/// Repository for order book level operations.
#[derive(Debug, Clone)]
pub struct OrderBookRepository {
    pool: PgPool,
}

impl OrderBookRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the open levels for one side of a symbol's book.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn open_levels(
        &self,
        symbol: &str,
        side: BookSide,
    ) -> Result<Vec<OrderBookLevelRecord>> {
        sqlx::query_as::<_, OrderBookLevelRecord>(
            r#"
            SELECT symbol, exchange_id, price, amount, side, status
            FROM order_book_levels
            WHERE symbol = $1 AND side = $2 AND status = $3
            "#,
        )
        .bind(symbol)
        .bind(side.as_str())
        .bind(LevelStatus::Open.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to query open levels")
    }
}

#[async_trait]
impl OrderBookStore for OrderBookRepository {
    async fn close_level(&self, symbol: &str, side: BookSide, price: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE order_book_levels
            SET status = $4, updated_at = NOW()
            WHERE symbol = $1 AND side = $2 AND price = $3 AND status = $5
            "#,
        )
        .bind(symbol)
        .bind(side.as_str())
        .bind(price)
        .bind(LevelStatus::Closed.as_str())
        .bind(LevelStatus::Open.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to close {side} level {price} for {symbol}"))?;

        Ok(result.rows_affected())
    }

    async fn upsert_level(&self, level: &OrderBookLevelRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_book_levels (symbol, exchange_id, price, amount, side, status)
            VALUES ($1, $2, $3, $4, $5, 'open')
            ON CONFLICT (symbol, price, side) WHERE status = 'open'
            DO UPDATE SET amount = EXCLUDED.amount, updated_at = NOW()
            "#,
        )
        .bind(&level.symbol)
        .bind(level.exchange_id)
        .bind(&level.price)
        .bind(&level.amount)
        .bind(&level.side)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert {} level {} for {}",
                level.side, level.price, level.symbol
            )
        })?;

        Ok(())
    }
}
