//! Configuration for manna

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::day;
use crate::error::MannaError;
use crate::rewards::RewardTable;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("manna")
}

fn default_db_path() -> PathBuf {
    default_data_dir().join("ledger.db")
}

fn default_feed_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_relay_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_epoch_start() -> String {
    "2023-05-13T22:20".to_string()
}

fn default_daily_limit() -> i64 {
    1000
}

fn default_poll_interval() -> u64 {
    30
}

fn default_distribution_interval() -> u64 {
    600
}

fn default_page_size() -> u32 {
    50
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the chain content API
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Base URL of the token-transfer relay
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    /// Public keys of the monitored owner accounts
    #[serde(default)]
    pub owners: Vec<String>,

    /// Campaign start instant, UTC, `%Y-%m-%dT%H:%M`
    #[serde(default = "default_epoch_start")]
    pub epoch_start: String,

    /// Per-sender daily payout cap in points (0 disables the cap)
    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,

    /// Feed cursor to start from when the database holds none yet
    #[serde(default)]
    pub start_cursor: Option<String>,

    /// Feed poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Distribution pass interval in seconds
    #[serde(default = "default_distribution_interval")]
    pub distribution_interval_secs: u64,

    /// Feed page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Point amounts per reward kind
    #[serde(default)]
    pub rewards: RewardTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            feed_url: default_feed_url(),
            relay_url: default_relay_url(),
            owners: Vec::new(),
            epoch_start: default_epoch_start(),
            daily_limit: default_daily_limit(),
            start_cursor: None,
            poll_interval_secs: default_poll_interval(),
            distribution_interval_secs: default_distribution_interval(),
            page_size: default_page_size(),
            rewards: RewardTable::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MannaError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MannaError::Config(format!("Invalid config: {}", e)))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MannaError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MannaError::Config(format!("Serialize failed: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Epoch start as unix seconds
    pub fn epoch_secs(&self) -> Result<i64, MannaError> {
        day::parse_epoch(&self.epoch_start)
    }
}
