//! Exchange, symbol and signal interval lookups.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ExchangeRecord, SignalIntervalRecord, SymbolRecord};
use crate::store::ReferenceData;

/// Read-only repository over the reference tables.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: PgPool,
}

impl ReferenceRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceData for ReferenceRepository {
    async fn active_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        sqlx::query_as::<_, ExchangeRecord>(
            r#"
            SELECT id, name, ws_url, rest_url, is_active, deleted_at
            FROM exchanges
            WHERE is_active AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load active exchanges")
    }

    async fn exchange(&self, id: Uuid) -> Result<Option<ExchangeRecord>> {
        sqlx::query_as::<_, ExchangeRecord>(
            r#"
            SELECT id, name, ws_url, rest_url, is_active, deleted_at
            FROM exchanges
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load exchange {id}"))
    }

    async fn symbols_by_exchange(&self, exchange_id: Uuid) -> Result<Vec<SymbolRecord>> {
        sqlx::query_as::<_, SymbolRecord>(
            r#"
            SELECT id, exchange_id, symbol, is_active, deleted_at
            FROM symbols
            WHERE exchange_id = $1 AND deleted_at IS NULL
            ORDER BY symbol ASC
            "#,
        )
        .bind(exchange_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load symbols for exchange {exchange_id}"))
    }

    async fn active_intervals(
        &self,
        exchange_id: Uuid,
        symbol: &str,
    ) -> Result<Vec<SignalIntervalRecord>> {
        sqlx::query_as::<_, SignalIntervalRecord>(
            r#"
            SELECT id, exchange_id, symbol, interval, is_active, deleted_at
            FROM signal_intervals
            WHERE exchange_id = $1 AND symbol = $2
              AND is_active AND deleted_at IS NULL
            ORDER BY interval ASC
            "#,
        )
        .bind(exchange_id)
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load intervals for {symbol}"))
    }

    async fn find_interval(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<SignalIntervalRecord>> {
        sqlx::query_as::<_, SignalIntervalRecord>(
            r#"
            SELECT id, exchange_id, symbol, interval, is_active, deleted_at
            FROM signal_intervals
            WHERE symbol = $1 AND interval = $2
              AND is_active AND deleted_at IS NULL
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(interval)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up interval {symbol}/{interval}"))
    }

    async fn find_symbol(&self, symbol: &str) -> Result<Option<SymbolRecord>> {
        sqlx::query_as::<_, SymbolRecord>(
            r#"
            SELECT id, exchange_id, symbol, is_active, deleted_at
            FROM symbols
            WHERE symbol = $1
            ORDER BY (deleted_at IS NULL) DESC, is_active DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up symbol {symbol}"))
    }
}
