use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads relay configuration by merging TOML, environment variables, and JSON.
    ///
    /// Nested keys are addressed with `__` in the environment, e.g.
    /// `APP_DATABASE__URL` or `APP_BROKER__KIND=memory`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration using `path` as the TOML source instead of the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(path = %path.display(), broker = ?config.broker.kind, "configuration loaded");
        Ok(config)
    }

    fn figment(toml: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(toml))
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
    }
}
