//! Idempotent seed of the default reference data.
//!
//! Inserts the Binance spot exchange with one symbol and one signal interval
//! so a fresh database can stream immediately. Existing rows are left alone.

use anyhow::{Context, Result};
use market_relay_core::normalize_symbol;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SeedPlan {
    pub exchange_name: String,
    pub ws_url: String,
    pub rest_url: String,
    pub symbols: Vec<String>,
    pub intervals: Vec<String>,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            exchange_name: "binance".to_string(),
            ws_url: "wss://stream.binance.com:443/ws".to_string(),
            rest_url: "https://api.binance.com/api/v3".to_string(),
            symbols: vec!["btcusdt".to_string()],
            intervals: vec!["1m".to_string()],
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub exchanges_created: u64,
    pub symbols_created: u64,
    pub intervals_created: u64,
}

/// Applies `plan`, creating whatever rows are missing.
///
/// # Errors
/// Returns an error if any query fails; the seed runs in one transaction.
pub async fn seed(pool: &PgPool, plan: &SeedPlan) -> Result<SeedReport> {
    let mut tx = pool.begin().await.context("Failed to begin seed transaction")?;
    let mut report = SeedReport::default();

    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM exchanges WHERE name = $1 AND deleted_at IS NULL",
    )
    .bind(&plan.exchange_name)
    .fetch_optional(&mut *tx)
    .await?;

    let exchange_id = match existing {
        Some((id,)) => id,
        None => {
            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO exchanges (id, name, ws_url, rest_url, is_active)
                VALUES ($1, $2, $3, $4, TRUE)
                "#,
            )
            .bind(id)
            .bind(&plan.exchange_name)
            .bind(&plan.ws_url)
            .bind(&plan.rest_url)
            .execute(&mut *tx)
            .await
            .context("Failed to seed exchange")?;
            report.exchanges_created += 1;
            id
        }
    };

    for symbol in plan.symbols.iter().map(|s| normalize_symbol(s)) {
        let result = sqlx::query(
            r#"
            INSERT INTO symbols (id, exchange_id, symbol, is_active)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (exchange_id, symbol) WHERE deleted_at IS NULL DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(exchange_id)
        .bind(&symbol)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to seed symbol {symbol}"))?;
        report.symbols_created += result.rows_affected();

        for interval in &plan.intervals {
            let result = sqlx::query(
                r#"
                INSERT INTO signal_intervals (id, exchange_id, symbol, interval, is_active)
                VALUES ($1, $2, $3, $4, TRUE)
                ON CONFLICT (exchange_id, symbol, interval) WHERE deleted_at IS NULL DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(exchange_id)
            .bind(&symbol)
            .bind(interval)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to seed interval {symbol}/{interval}"))?;
            report.intervals_created += result.rows_affected();
        }
    }

    tx.commit().await.context("Failed to commit seed")?;
    tracing::info!(
        exchange = %plan.exchange_name,
        exchanges = report.exchanges_created,
        symbols = report.symbols_created,
        intervals = report.intervals_created,
        "seed applied"
    );
    Ok(report)
}
