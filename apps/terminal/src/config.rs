//! # Terminal Configuration
//!
//! Everything a terminal needs at start-up, in one TOML file.
//!
//! ## Configuration Sources (later overrides earlier)
//! 1. Defaults (this file)
//! 2. Config file (`terminal.toml` in the platform config dir, or a given path)
//! 3. Environment variables (`TURNSTILE_*`)
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "till-north-1"
//! name = "North Gate Box Office"
//!
//! [database]
//! path = "/var/lib/turnstile/turnstile.db"
//! max_connections = 5
//!
//! [settings]
//! currency = "USD"
//! tax_rate_bps = 800
//! tip_presets_bps = [1500, 1800, 2000]
//! fraud_threshold_minor = 50000
//!
//! [sync]
//! remote_url = "https://ledger.example.com/api/"
//! poll_interval_secs = 15
//!
//! [reports]
//! cache_ttl_secs = 60
//! ```
//!
//! ## Environment Variables
//! | Variable                        | Field                          |
//! |---------------------------------|--------------------------------|
//! | `TURNSTILE_DEVICE_ID`           | `device.id`                    |
//! | `TURNSTILE_DEVICE_NAME`         | `device.name`                  |
//! | `TURNSTILE_DB_PATH`             | `database.path`                |
//! | `TURNSTILE_CURRENCY`            | `settings.currency`            |
//! | `TURNSTILE_TAX_RATE_BPS`        | `settings.tax_rate_bps`        |
//! | `TURNSTILE_FRAUD_THRESHOLD`     | `settings.fraud_threshold_minor` |
//! | `TURNSTILE_REMOTE_URL`          | `sync.remote_url`              |
//! | `TURNSTILE_SYNC_INTERVAL_SECS`  | `sync.poll_interval_secs`      |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use turnstile_core::Settings;
use turnstile_sync::SyncConfig;

const CONFIG_FILE: &str = "terminal.toml";
const DATABASE_FILE: &str = "turnstile.db";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// No path given and no platform config directory.
    #[error("No config path available")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

/// `[device]`: identifies this terminal in logs and sync envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub id: String,
    pub name: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            id: Uuid::new_v4().to_string(),
            name: "Turnstile Terminal".to_string(),
        }
    }
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
        }
    }
}

/// `[reports]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// How long a computed daily report is served from cache.
    pub cache_ttl_secs: u64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        ReportSettings { cache_ttl_secs: 60 }
    }
}

// =============================================================================
// Terminal Config
// =============================================================================

/// Complete terminal configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub device: DeviceSettings,
    pub database: DatabaseSettings,
    pub settings: Settings,
    pub sync: SyncConfig,
    pub reports: ReportSettings,
}

impl TerminalConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading terminal config from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a config file without applying overrides.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Terminal config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(ConfigError::Invalid("device.id must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        self.settings
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("settings: {}", e)))?;
        self.sync
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("sync: {}", e)))?;

        Ok(())
    }

    /// Database file, falling back to the platform data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let dirs = directories::ProjectDirs::from("com", "turnstile", "terminal")
            .ok_or(ConfigError::NoConfigPath)?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join(DATABASE_FILE))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TURNSTILE_*` overrides from `lookup`. Unparseable values are
    /// logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TURNSTILE_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("TURNSTILE_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(path) = lookup("TURNSTILE_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(currency) = lookup("TURNSTILE_CURRENCY") {
            match currency.parse() {
                Ok(code) => self.settings.currency = code,
                Err(_) => warn!(currency = %currency, "Unknown currency in environment"),
            }
        }

        if let Some(rate) = lookup("TURNSTILE_TAX_RATE_BPS") {
            match rate.parse::<u32>() {
                Ok(bps) => self.settings.tax_rate_bps = bps,
                Err(_) => warn!(rate = %rate, "Invalid tax rate in environment"),
            }
        }

        if let Some(threshold) = lookup("TURNSTILE_FRAUD_THRESHOLD") {
            match threshold.parse::<i64>() {
                Ok(minor) => self.settings.fraud_threshold_minor = minor,
                Err(_) => warn!(threshold = %threshold, "Invalid fraud threshold in environment"),
            }
        }

        if let Some(url) = lookup("TURNSTILE_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.sync.remote_url = Some(url).filter(|u| !u.trim().is_empty());
        }

        if let Some(secs) = lookup("TURNSTILE_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.poll_interval_secs = s,
                Err(_) => warn!(secs = %secs, "Invalid sync interval in environment"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "turnstile", "terminal")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }
}
