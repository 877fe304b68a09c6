use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::MonitorError;

const DEFAULT_INTERVAL_SECS: u64 = 300;
const DEFAULT_WORKSHEET: &str = "System Monitor";

/// Agent configuration, persisted as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    /// When false the directory list is ignored and samples carry no directory stats
    #[serde(default = "default_true")]
    pub monitor_directories: bool,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default = "default_drain_secs")]
    pub shutdown_drain_secs: u64,
}

/// Where rows are delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Path to the service account key file
    #[serde(default)]
    pub credentials_ref: String,
    /// Spreadsheet id or full spreadsheet URL
    #[serde(default)]
    pub destination_id: String,
    #[serde(default = "default_worksheet")]
    pub worksheet_name: String,
}

/// Whether the sink can be trusted to discard rows it has already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliverySemantics {
    /// Retries after an ambiguous failure may write a row twice
    #[default]
    AtLeastOnce,
    /// The sink dedups by `sequence_id`, so retries are always safe
    SinkDeduplicates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub semantics: DeliverySemantics,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

fn default_drain_secs() -> u64 {
    10
}

fn default_worksheet() -> String {
    DEFAULT_WORKSHEET.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECS,
            directories: Vec::new(),
            monitor_directories: true,
            sink: SinkConfig::default(),
            delivery: DeliveryConfig::default(),
            shutdown_drain_secs: default_drain_secs(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            credentials_ref: String::new(),
            destination_id: String::new(),
            worksheet_name: default_worksheet(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            batch_size: 10,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            request_timeout_secs: 30,
            semantics: DeliverySemantics::AtLeastOnce,
        }
    }
}

impl Config {
    /// Load the config from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if data.trim().is_empty() {
            return Ok(Config::default());
        }

        serde_json::from_str(&data).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let data = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, data).with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().with_context(|| "Could not determine config directory")?;

        Ok(config_dir.join("sheetmon").join("config.json"))
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> crate::Result<()> {
        if self.interval_seconds == 0 {
            return Err(MonitorError::config_invalid(
                "interval_seconds must be greater than zero",
            ));
        }

        if self.monitor_directories && self.directories.is_empty() {
            return Err(MonitorError::config_invalid(
                "directory monitoring is enabled but no directories are configured",
            ));
        }

        let delivery = &self.delivery;
        if delivery.queue_capacity < 2 {
            return Err(MonitorError::config_invalid(
                "delivery.queue_capacity must be at least 2",
            ));
        }
        if delivery.batch_size == 0 {
            return Err(MonitorError::config_invalid(
                "delivery.batch_size must be at least 1",
            ));
        }
        if delivery.max_attempts == 0 {
            return Err(MonitorError::config_invalid(
                "delivery.max_attempts must be at least 1",
            ));
        }
        if delivery.base_delay_ms == 0 {
            return Err(MonitorError::config_invalid(
                "delivery.base_delay_ms must be greater than zero",
            ));
        }
        if delivery.max_delay_ms < delivery.base_delay_ms {
            return Err(MonitorError::config_invalid(
                "delivery.max_delay_ms must not be smaller than delivery.base_delay_ms",
            ));
        }

        Ok(())
    }

    /// Extra checks needed only by the Google Sheets sink
    pub fn validate_sink(&self) -> crate::Result<()> {
        if self.sink.credentials_ref.trim().is_empty() {
            return Err(MonitorError::config_invalid("sink.credentials_ref is not set"));
        }
        if self.sink.destination_id.trim().is_empty() {
            return Err(MonitorError::config_invalid("sink.destination_id is not set"));
        }
        if self.sink.worksheet_name.trim().is_empty() {
            return Err(MonitorError::config_invalid("sink.worksheet_name is empty"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    /// Add a monitored directory. Returns false if it is already present.
    pub fn add_directory(&mut self, path: PathBuf) -> bool {
        if self.directories.contains(&path) {
            return false;
        }
        self.directories.push(path);
        true
    }

    pub fn remove_directory(&mut self, path: &Path) -> bool {
        if let Some(pos) = self.directories.iter().position(|p| p == path) {
            self.directories.remove(pos);
            return true;
        }
        false
    }
}

/// Copy-on-write handle to the active config.
///
/// Readers take a cheap `Arc` snapshot and never observe a half-applied reload.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.read().clone()
    }

    /// Swap in a new snapshot, returning the previous one
    pub fn replace(&self, config: Config) -> Arc<Config> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(config))
    }
}
