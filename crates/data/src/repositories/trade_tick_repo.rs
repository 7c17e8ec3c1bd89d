//! Price tick repository.
//!
//! Stores aggregated trades forwarded by the relational trade writer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::PriceTickRecord;
use crate::store::TradeStore;

/// Repository for price tick operations.
#[derive(Debug, Clone)]
pub struct PriceTickRepository {
    pool: PgPool,
}

impl PriceTickRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets the most recent tick for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_latest(&self, symbol: &str) -> Result<Option<PriceTickRecord>> {
        sqlx::query_as::<_, PriceTickRecord>(
            r#"
            SELECT symbol, price, quantity, trade_id, trade_time, is_buyer_maker,
                   event_time, event_type, document_id
            FROM price_ticks
            WHERE symbol = $1
            ORDER BY trade_time DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query latest price tick")
    }
}

#[async_trait]
impl TradeStore for PriceTickRepository {
    async fn insert_price_tick(&self, tick: &PriceTickRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_ticks
                (symbol, price, quantity, trade_id, trade_time, is_buyer_maker,
                 event_time, event_type, document_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&tick.symbol)
        .bind(tick.price)
        .bind(tick.quantity)
        .bind(tick.trade_id)
        .bind(tick.trade_time)
        .bind(tick.is_buyer_maker)
        .bind(tick.event_time)
        .bind(&tick.event_type)
        .bind(&tick.document_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert price tick {}", tick.trade_id))?;

        Ok(())
    }
}
