//! Document store.
//!
//! Raw frames and mirrored records are kept as JSON documents grouped into
//! named collections. The Postgres implementation stores each document as a
//! JSONB row; keyed documents support upsert-on-conflict.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Collection names.
pub mod collections {
    pub const AGG_TRADES: &str = "agg_trades";
    pub const ORDER_BOOKS: &str = "order_books";
    pub const CANDLESTICK_FRAMES: &str = "candlestick_frames";
    pub const ORDER_BOOK_LEVELS: &str = "order_book_levels";
    pub const CANDLESTICKS: &str = "candlesticks";
    pub const SIGNALS: &str = "signals";
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts an unkeyed document and returns its generated id.
    async fn insert(&self, collection: &str, document: &JsonValue) -> Result<String>;

    /// Inserts the keyed document, or merges `document` into the existing one.
    async fn upsert(&self, collection: &str, key: &str, document: &JsonValue) -> Result<()>;

    /// Merges `fields` into an existing keyed document. Returns the number of documents changed.
    async fn update(&self, collection: &str, key: &str, fields: &JsonValue) -> Result<u64>;
}

/// JSONB-backed document store sharing the relational pool.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetches a keyed document.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, collection: &str, key: &str) -> Result<Option<JsonValue>> {
        let row: Option<(JsonValue,)> = sqlx::query_as(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND doc_key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch document")?;

        Ok(row.map(|r| r.0))
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, collection: &str, document: &JsonValue) -> Result<String> {
        let id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO documents (collection, body)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(collection)
        .bind(document)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to insert document into {collection}"))?;

        Ok(id.0.to_string())
    }

    async fn upsert(&self, collection: &str, key: &str, document: &JsonValue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, doc_key, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, doc_key) WHERE doc_key IS NOT NULL
            DO UPDATE SET body = documents.body || EXCLUDED.body, updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(document)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert document {key} in {collection}"))?;

        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &JsonValue) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = body || $3, updated_at = NOW()
            WHERE collection = $1 AND doc_key = $2
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(fields)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update document {key} in {collection}"))?;

        Ok(result.rows_affected())
    }
}
