//! Diagnostic verbosity
//!
//! The protocol layers log through `tracing`, but how much protocol detail
//! they produce is decided by an explicit [`LogConfig`] handed to each
//! component rather than by global state.

use serde::{Deserialize, Serialize};

/// Command entry and session milestones
pub const LEVEL_CALLS: u8 = 2;
/// Response validation results and parse detail
pub const LEVEL_DETAIL: u8 = 3;
/// Hex dumps of sent messages, framing decisions, byte mismatches
pub const LEVEL_MESSAGES: u8 = 4;
/// Every raw chunk received from the link
pub const LEVEL_RAW: u8 = 5;

/// Protocol diagnostic verbosity (0 = errors only, 5 = raw traffic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Verbosity level, 0..=5
    pub verbosity: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: LEVEL_CALLS,
        }
    }
}

impl LogConfig {
    /// Highest meaningful verbosity
    pub const MAX_VERBOSITY: u8 = LEVEL_RAW;

    /// Create a config, clamping to the supported range
    pub fn new(verbosity: u8) -> Self {
        Self {
            verbosity: verbosity.min(Self::MAX_VERBOSITY),
        }
    }

    /// Whether diagnostics at `level` should be produced
    pub fn enabled(&self, level: u8) -> bool {
        self.verbosity >= level
    }

    /// `tracing` level name matching this verbosity, for subscriber filters
    pub fn tracing_level(&self) -> &'static str {
        match self.verbosity {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }

    /// Dump a message as hex when message-level diagnostics are on
    pub fn dump(&self, label: &str, bytes: &[u8]) {
        if self.enabled(LEVEL_MESSAGES) {
            tracing::trace!("{label}: {}", hex_string(bytes));
        }
    }
}

/// Format bytes as space separated lowercase hex
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_is_clamped() {
        assert_eq!(LogConfig::new(9).verbosity, LogConfig::MAX_VERBOSITY);
        assert_eq!(LogConfig::new(3).verbosity, 3);
    }

    #[test]
    fn test_enabled_levels() {
        let log = LogConfig::new(LEVEL_DETAIL);
        assert!(log.enabled(LEVEL_CALLS));
        assert!(log.enabled(LEVEL_DETAIL));
        assert!(!log.enabled(LEVEL_MESSAGES));
    }

    #[test]
    fn test_tracing_level_mapping() {
        assert_eq!(LogConfig::new(0).tracing_level(), "error");
        assert_eq!(LogConfig::default().tracing_level(), "info");
        assert_eq!(LogConfig::new(5).tracing_level(), "trace");
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x23, 0x0a, 0xff]), "23 0a ff");
        assert_eq!(hex_string(&[]), "");
    }
}
