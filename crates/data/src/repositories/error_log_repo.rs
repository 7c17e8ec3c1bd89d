use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::ErrorLogRecord;
use crate::store::ErrorLogStore;

#[derive(Debug, Clone)]
pub struct ErrorLogRepository {
    pool: PgPool,
}

impl ErrorLogRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ErrorLogStore for ErrorLogRepository {
    async fn append_error_log(&self, entry: &ErrorLogRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO error_logs (title, message, entity, kind)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&entry.title)
        .bind(&entry.message)
        .bind(&entry.entity)
        .bind(&entry.kind)
        .execute(&self.pool)
        .await
        .context("Failed to append error log")?;

        Ok(())
    }
}
