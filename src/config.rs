use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;

const DEFAULT_CONFIG_PATH: &str = "guildkeeper.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// Prefix given to guilds initialized without one.
    pub default_prefix: String,
    /// `tracing_subscriber` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "database/guilds.db".to_string(),
            default_prefix: "!".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads `.env`, then the TOML file named by `GUILDKEEPER_CONFIG` (or
    /// `guildkeeper.toml` if present), then applies environment overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let base = match env::var("GUILDKEEPER_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if fs::metadata(DEFAULT_CONFIG_PATH).is_ok() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => Self::default(),
        };
        base.with_env_overrides()
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path))
    }

    fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(prefix) = env::var("DEFAULT_PREFIX") {
            self.default_prefix = prefix;
        }
        if let Ok(filter) = env::var("RUST_LOG") {
            self.log_filter = filter;
        }
        if self.default_prefix.trim().is_empty() {
            anyhow::bail!("DEFAULT_PREFIX may not be empty");
        }
        Ok(self)
    }
}
