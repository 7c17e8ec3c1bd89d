use anyhow::{Context, Result};
use market_relay_core::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::repositories::Repositories;

/// Owns the Postgres pool shared by every repository and the document store.
#[derive(Debug, Clone)]
pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the configured `PostgreSQL` database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .context("Failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    /// Returns an error if any migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn repositories(&self) -> Repositories {
        Repositories::new(self.pool.clone())
    }
}
