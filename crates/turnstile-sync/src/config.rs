//! # Sync Configuration
//!
//! The `[sync]` section of the terminal configuration.
//!
//! ## Configuration File Format
//! ```toml
//! [sync]
//! remote_url = "https://ledger.example.com/api/"
//! batch_size = 50
//! poll_interval_secs = 15
//! request_timeout_secs = 10
//! max_attempts = 8
//! initial_backoff_ms = 1000
//! max_backoff_secs = 300
//! jitter = 0.2
//! ```
//!
//! ## Retry Schedule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 fails → wait ≈ initial_backoff                               │
//! │  attempt 2 fails → wait ≈ initial_backoff × 2                           │
//! │  attempt n fails → wait ≈ min(initial_backoff × 2^(n-1), max_backoff)   │
//! │  attempt max_attempts fails → entry marked Failed (manual retry)        │
//! │                                                                         │
//! │  ≈ : each wait is spread by ±jitter so tills that lost the network     │
//! │      together do not hammer the remote together                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Remote delivery settings.
///
/// Without a `remote_url` the terminal runs offline: mutations still queue
/// up and are delivered once a URL is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote ledger.
    pub remote_url: Option<String>,

    /// Queue entries fetched per delivery round.
    pub batch_size: u32,

    /// Interval between delivery rounds (seconds).
    pub poll_interval_secs: u64,

    /// Timeout for a single remote call (seconds).
    pub request_timeout_secs: u64,

    /// Attempts before an entry is parked as failed.
    pub max_attempts: u32,

    /// First retry delay (milliseconds).
    pub initial_backoff_ms: u64,

    /// Longest retry delay (seconds).
    pub max_backoff_secs: u64,

    /// Randomization factor applied to each delay, 0.0 to 1.0.
    pub jitter: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            remote_url: None,
            batch_size: 50,
            poll_interval_secs: 15,
            request_timeout_secs: 10,
            max_attempts: 8,
            initial_backoff_ms: 1_000,
            max_backoff_secs: 300,
            jitter: 0.2,
        }
    }
}

impl SyncConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(url) = &self.remote_url {
            let parsed = Url::parse(url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    url
                )));
            }
        }

        if self.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.initial_backoff_ms == 0 || self.initial_backoff() > self.max_backoff() {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be positive and not exceed max_backoff_secs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(SyncError::InvalidConfig(
                "jitter must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// The parsed remote URL, if one is configured.
    pub fn remote_url(&self) -> SyncResult<Option<Url>> {
        self.remote_url
            .as_deref()
            .map(|u| Url::parse(u).map_err(SyncError::from))
            .transpose()
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            // `Default` starts current_interval at 500ms regardless of
            // initial_interval, so set both.
            current_interval: self.initial_backoff(),
            initial_interval: self.initial_backoff(),
            max_interval: self.max_backoff(),
            randomization_factor: self.jitter,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay before the next try of an entry that has now failed `attempts` times.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let mut backoff = self.create_backoff();
        let mut delay = self.initial_backoff();
        for _ in 0..attempts.max(1) {
            delay = backoff.next_backoff().unwrap_or_else(|| self.max_backoff());
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> SyncConfig {
        SyncConfig {
            jitter: 0.0,
            initial_backoff_ms: 1_000,
            max_backoff_secs: 10,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid_and_offline() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.remote_url().unwrap().is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig {
            remote_url: Some("ws://ledger.local".into()),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote_url = Some("not a url".into());
        assert!(config.validate().is_err());

        config.remote_url = Some("https://ledger.example.com/api/".into());
        assert!(config.validate().is_ok());

        config.batch_size = 0;
        assert!(config.validate().is_err());
        config.batch_size = 10;

        config.jitter = 1.5;
        assert!(config.validate().is_err());
        config.jitter = 0.0;

        config.initial_backoff_ms = 600_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_doubles_up_to_cap() {
        let config = no_jitter();

        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(2), Duration::from_secs(2));
        assert_eq!(config.retry_delay(3), Duration::from_secs(4));
        assert_eq!(config.retry_delay(4), Duration::from_secs(8));
        assert_eq!(config.retry_delay(5), Duration::from_secs(10));
        assert_eq!(config.retry_delay(20), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_delay_jitter_stays_in_bounds() {
        let config = SyncConfig {
            jitter: 0.5,
            ..no_jitter()
        };
        for _ in 0..20 {
            let delay = config.retry_delay(1);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1_500));
        }
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let parsed: SyncConfig = serde_json::from_str(r#"{"batch_size": 5}"#).unwrap();
        assert_eq!(parsed.batch_size, 5);
        assert_eq!(parsed.max_attempts, SyncConfig::default().max_attempts);
    }
}
