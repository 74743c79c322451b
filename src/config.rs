use crate::constants::DEFAULT_RETURN_INVOICE_PREFIX;
use crate::error::{DashboardError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub portal: PortalConfig,
    pub aggregation: AggregationConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/retail_pulse.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub inbox_dir: String,
    pub archive_dir: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            inbox_dir: "data_input".to_string(),
            archive_dir: "data_archive".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Export URL of the vendor report. Fetching is disabled when unset.
    pub report_url: Option<String>,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            report_url: None,
            timeout_seconds: 60,
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub return_invoice_prefix: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            return_invoice_prefix: DEFAULT_RETURN_INVOICE_PREFIX.to_string(),
        }
    }
}

/// Daily fetch-and-sweep while `serve` runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local time of day, `HH:MM`.
    pub daily_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_at: "06:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                DashboardError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str::<Config>(&content)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db) = std::env::var("RETAIL_PULSE_DB") {
            self.storage.database_path = db;
        }
        if let Ok(port) = std::env::var("RETAIL_PULSE_PORT") {
            self.server.port = port.parse().map_err(|_| {
                DashboardError::Config(format!("RETAIL_PULSE_PORT is not a valid port: {port}"))
            })?;
        }
        if let Ok(url) = std::env::var("RETAIL_PULSE_REPORT_URL") {
            self.portal.report_url = Some(url);
        }
        Ok(())
    }
}
