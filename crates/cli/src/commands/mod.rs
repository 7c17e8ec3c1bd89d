pub mod relay;
pub mod setup;

pub use relay::{run_all, run_consume, run_stream, RelayArgs};
pub use setup::{run_migrate, run_seed, SeedArgs};

use anyhow::Result;
use market_relay_core::{AppConfig, ConfigLoader};

/// Loads the config file and applies command-line overrides.
///
/// # Errors
/// Returns an error if the configuration cannot be read or parsed.
pub fn load_config(path: &str, database_url: Option<String>) -> Result<AppConfig> {
    let mut config = ConfigLoader::load_from(path)?;
    if let Some(url) = database_url {
        config.database.url = url;
    }
    Ok(config)
}
