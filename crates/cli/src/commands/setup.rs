//! Schema and reference-data commands.

use anyhow::Result;
use clap::Args;
use market_relay_core::AppConfig;
use market_relay_data::seed::{seed, SeedPlan};
use market_relay_data::DatabaseClient;

/// Arguments for the seed command. Omitted values fall back to the default plan.
#[derive(Args, Debug, Clone, Default)]
pub struct SeedArgs {
    /// Symbol to register, may be repeated (e.g., "btcusdt")
    #[arg(long = "symbol")]
    pub symbols: Vec<String>,

    /// Signal interval to track for every symbol, may be repeated (e.g., "1m")
    #[arg(long = "interval")]
    pub intervals: Vec<String>,
}

impl SeedArgs {
    fn plan(self) -> SeedPlan {
        let mut plan = SeedPlan::default();
        if !self.symbols.is_empty() {
            plan.symbols = self.symbols;
        }
        if !self.intervals.is_empty() {
            plan.intervals = self.intervals;
        }
        plan
    }
}

/// # Errors
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run_migrate(config: &AppConfig) -> Result<()> {
    let db = DatabaseClient::connect(&config.database).await?;
    db.migrate().await
}

/// Migrates, then seeds.
///
/// # Errors
/// Returns an error if the database is unreachable or the seed transaction fails.
pub async fn run_seed(config: &AppConfig, args: SeedArgs) -> Result<()> {
    let db = DatabaseClient::connect(&config.database).await?;
    db.migrate().await?;

    let report = seed(db.pool(), &args.plan()).await?;
    println!(
        "Seeded {} exchange(s), {} symbol(s), {} interval(s)",
        report.exchanges_created, report.symbols_created, report.intervals_created
    );
    Ok(())
}
