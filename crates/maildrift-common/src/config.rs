//! Configuration for Maildrift

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Mailbox-state cache configuration
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Mailbox-state cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// First message status value no longer visible to sessions
    #[serde(default = "default_purge_threshold")]
    pub purge_threshold: i16,

    /// Consecutive differential loads allowed before a forced cold load
    #[serde(default = "default_max_differential_iterations")]
    pub max_differential_iterations: u32,

    /// Maximum UID list length per statement when flushing \Recent flags
    #[serde(default = "default_recent_flush_batch")]
    pub recent_flush_batch: usize,

    /// Transition deleted-but-unpurged rows to purge status during cold loads
    #[serde(default)]
    pub repair_deleted: bool,

    /// Maximum rows repaired per cold load
    #[serde(default = "default_repair_budget")]
    pub repair_budget: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            purge_threshold: default_purge_threshold(),
            max_differential_iterations: default_max_differential_iterations(),
            recent_flush_batch: default_recent_flush_batch(),
            repair_deleted: false,
            repair_budget: default_repair_budget(),
        }
    }
}

fn default_purge_threshold() -> i16 {
    2
}

fn default_max_differential_iterations() -> u32 {
    100
}

fn default_recent_flush_batch() -> usize {
    100
}

fn default_repair_budget() -> usize {
    100
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/maildrift/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
