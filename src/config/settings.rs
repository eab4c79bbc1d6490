/*
* Fleet accounting configuration
* ------------------------------
*
* Layers, lowest priority first:
* 1. Hard-coded defaults below
* 2. <CONFIG_PATH>/default.toml (optional)
* 3. <CONFIG_PATH>/local.toml (optional)
* 4. Environment variables prefixed APP_, nested keys joined by a double
*    underscore, e.g. APP_ACCOUNTING__CHARGE_GRANULARITY_MINUTES=60
*
* The only accounting knob is the charge granularity. It is validated when
* the engine is built, not when the file is parsed, so `init` can still
* write out a config that someone later edits by hand.
*/

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::accounting::ChargeGranularity;
use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub accounting: AccountingSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingSettings {
    pub charge_granularity_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        info!("Loading configuration from path: {}", config_path);

        let config = Self::with_defaults()?
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false))
            .add_source(Environment::with_prefix("APP").prefix_separator("_").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn new_from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from file: {}", path.display());

        let config = Self::with_defaults()?
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("APP").prefix_separator("_").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = generate_default_config();
        Ok(Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("server.api_prefix", defaults.server.api_prefix)?
            .set_default(
                "accounting.charge_granularity_minutes",
                i64::from(defaults.accounting.charge_granularity_minutes),
            )?
            .set_default("store.path", defaults.store.path.to_string_lossy().into_owned())?
            .set_default("store.read_timeout_ms", defaults.store.read_timeout_ms as i64)?
            .set_default("logging.level", defaults.logging.level)?)
    }

    pub fn charge_granularity(&self) -> Result<ChargeGranularity, ConfigError> {
        ChargeGranularity::new(self.accounting.charge_granularity_minutes)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.store.read_timeout_ms)
    }
}

pub fn generate_default_config() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_prefix: "/api/v1".to_string(),
        },
        accounting: AccountingSettings {
            charge_granularity_minutes: 1,
        },
        store: StoreSettings {
            path: PathBuf::from("/var/lib/fleet-accounting/store.json"),
            read_timeout_ms: 5_000,
        },
        logging: LoggingSettings {
            level: "info".to_string(),
        },
    }
}
