//! Application settings
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. `txflow.toml` in the working directory (optional)
//! 3. `TXFLOW__*` environment variables, `__` separating nested keys
//!    (e.g. `TXFLOW__TRANSACTION__MAX_RETRIES=5`, `TXFLOW__DEDUP__STORE=memory`)

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use txflow_core::domain::{DedupSettings, TransactionConfig, TransactionSettings};

const CONFIG_FILE: &str = "txflow";
const DEFAULT_DB_PATH: &str = "txflow.db";
const DEFAULT_OPERATION_LOG_PATH: &str = "txflow-operations.db";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Database the unit of work writes to (also holds the dedup table)
    pub database_path: String,
    /// Separate database for the workflow operation log
    pub operation_log_path: String,
    pub transaction: TransactionSettings,
    pub dedup: DedupSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DB_PATH.to_string(),
            operation_log_path: DEFAULT_OPERATION_LOG_PATH.to_string(),
            transaction: TransactionSettings::default(),
            dedup: DedupSettings::default(),
        }
    }
}

impl AppSettings {
    /// Load from `txflow.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::build(
            Config::builder().add_source(File::with_name(CONFIG_FILE).required(false)),
        )
    }

    /// Load from a TOML document and the environment
    pub fn from_toml(toml: &str) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .add_source(
                Environment::with_prefix("TXFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Validated transaction config
    pub fn transaction_config(&self) -> Result<TransactionConfig> {
        TransactionConfig::try_from(self.transaction.clone())
            .context("Invalid transaction settings")
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database_path)
    }

    pub fn operation_log_url(&self) -> String {
        format!("sqlite://{}", self.operation_log_path)
    }
}
