//! Session configuration
//!
//! Link speeds, device timing and retry ceilings for one logger session.
//! Defaults match the hardware; a JSON file can override any field.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::logging::LogConfig;
use crate::protocol::{
    HIGH_SPEED_BAUD, LOW_SPEED_BAUD, NEGOTIATION_ATTEMPTS, POINT_READ_ATTEMPTS,
    POLL_INTERVAL_MS, RETUNE_DELAY_MS, SETTLE_DELAY_MS,
};

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    /// File is not valid JSON for [`SessionConfig`]
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
    /// Values out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a logger session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device path (e.g. "/dev/ttyUSB0")
    pub device: String,
    /// Baud rate the device listens at after power-up or reset
    pub low_baud: u32,
    /// Baud rate used once negotiation succeeds
    pub high_baud: u32,
    /// Bounded wait per read poll in milliseconds
    pub poll_interval_ms: u64,
    /// Pause after opening the port before the first command
    pub settle_delay_ms: u64,
    /// Pause after switching to high speed so the device can retune
    pub retune_delay_ms: u64,
    /// Ceiling on negotiation attempts
    pub negotiation_attempts: usize,
    /// Ceiling on read polls per downloaded record
    pub point_read_attempts: usize,
    /// Protocol diagnostics
    pub log: LogConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            low_baud: LOW_SPEED_BAUD,
            high_baud: HIGH_SPEED_BAUD,
            poll_interval_ms: POLL_INTERVAL_MS,
            settle_delay_ms: SETTLE_DELAY_MS,
            retune_delay_ms: RETUNE_DELAY_MS,
            negotiation_attempts: NEGOTIATION_ATTEMPTS,
            point_read_attempts: POINT_READ_ATTEMPTS,
            log: LogConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Hardware defaults for the given device path
    pub fn for_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Defaults with every device delay removed (simulated devices)
    pub fn without_delays() -> Self {
        Self {
            settle_delay_ms: 0,
            retune_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Load overrides from a JSON file; missing fields keep their defaults
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.low_baud == 0 || self.high_baud == 0 {
            return Err(ConfigError::Invalid("baud rates must be non-zero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be non-zero".into()));
        }
        if self.negotiation_attempts == 0 || self.point_read_attempts == 0 {
            return Err(ConfigError::Invalid("retry ceilings must be at least 1".into()));
        }
        Ok(())
    }

    /// Longest single wait for input
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pause after opening the port
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Pause after switching to high speed
    pub fn retune_delay(&self) -> Duration {
        Duration::from_millis(self.retune_delay_ms)
    }
}
