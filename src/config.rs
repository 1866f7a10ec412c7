//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Result, TrackingError};

/// Tunables for the poll loop and descriptor negotiation.
///
/// All fields have defaults, so a YAML document only needs the keys it
/// overrides:
///
/// ```rust
/// use handtrack::ServiceConfig;
///
/// let config = ServiceConfig::from_yaml_str("poll_timeout_ms: 250").unwrap();
/// assert_eq!(config.poll_timeout().as_millis(), 250);
/// assert_eq!(config.initial_serial_capacity, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bounded wait per poll; also the worst-case shutdown latency
    pub poll_timeout_ms: u64,
    /// Serial buffer size for the first descriptor request
    pub initial_serial_capacity: usize,
    /// First backoff after a failed poll
    pub error_backoff_ms: u64,
    /// Backoff ceiling (never longer than the poll timeout)
    pub max_error_backoff_ms: u64,
    /// Name of the poll thread
    pub thread_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            initial_serial_capacity: 1,
            error_backoff_ms: 10,
            max_error_backoff_ms: 500,
            thread_name: "handtrack-poll".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ServiceConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TrackingError::recording_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(TrackingError::parse_error("config", "poll_timeout_ms must be > 0"));
        }
        if self.initial_serial_capacity == 0 {
            return Err(TrackingError::parse_error(
                "config",
                "initial_serial_capacity must be > 0",
            ));
        }
        if self.thread_name.is_empty() {
            return Err(TrackingError::parse_error("config", "thread_name must not be empty"));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Backoff to apply after `consecutive_failures` failed polls in a row.
    ///
    /// Doubles from `error_backoff_ms`, capped by both the configured maximum
    /// and the poll timeout.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let shift = consecutive_failures.saturating_sub(1).min(16);
        let ms = self
            .error_backoff_ms
            .saturating_mul(1 << shift)
            .min(self.max_error_backoff_ms)
            .min(self.poll_timeout_ms);
        Duration::from_millis(ms)
    }
}
