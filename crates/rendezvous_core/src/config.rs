//! # Rendezvous Configuration
//!
//! Tunables loaded once at startup, either built in code or read from a TOML
//! file:
//!
//! ```toml
//! stuck_warning_interval_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RendezvousError, RendezvousResult};

/// Configuration shared by every rendezvous created from it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendezvousConfig {
    /// How long a participant may block before a "may be stuck" warning is
    /// logged (ms). Purely observational: the wait itself never times out.
    pub stuck_warning_interval_ms: u64,
}

impl RendezvousConfig {
    /// Default stuck-wait warning interval (ms).
    pub const DEFAULT_STUCK_WARNING_INTERVAL_MS: u64 = 5_000;

    /// Short interval for tests and local debugging.
    #[must_use]
    pub const fn quick() -> Self {
        Self {
            stuck_warning_interval_ms: 50,
        }
    }

    /// Interval after which a blocked participant is reported.
    #[inline]
    #[must_use]
    pub const fn stuck_warning_interval(&self) -> Duration {
        Duration::from_millis(self.stuck_warning_interval_ms)
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::InvalidConfig`] if the interval is zero.
    pub fn validate(&self) -> RendezvousResult<()> {
        if self.stuck_warning_interval_ms == 0 {
            return Err(RendezvousError::InvalidConfig(
                "stuck_warning_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::InvalidConfig`] on malformed TOML, unknown
    /// keys, or invalid values.
    pub fn from_toml_str(text: &str) -> RendezvousResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| RendezvousError::InvalidConfig(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::InvalidConfig`] if the file cannot be read or
    /// does not hold a valid configuration.
    pub fn from_toml_file(path: impl AsRef<Path>) -> RendezvousResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RendezvousError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            stuck_warning_interval_ms: Self::DEFAULT_STUCK_WARNING_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_five_seconds() {
        let config = RendezvousConfig::default();
        assert_eq!(config.stuck_warning_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = RendezvousConfig::from_toml_str("stuck_warning_interval_ms = 250").unwrap();
        assert_eq!(config.stuck_warning_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = RendezvousConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendezvousConfig::default());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = RendezvousConfig::from_toml_str("stuck_warning_interval_ms = 0").unwrap_err();
        assert!(matches!(err, RendezvousError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = RendezvousConfig::from_toml_str("timeout_ms = 10").unwrap_err();
        assert!(matches!(err, RendezvousError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("rendezvous_config_does_not_exist.toml");
        let err = RendezvousConfig::from_toml_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_read_file() {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("test_rendezvous_config_{id}.toml"));
        std::fs::write(&path, "stuck_warning_interval_ms = 1200\n").unwrap();

        let config = RendezvousConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.stuck_warning_interval_ms, 1200);

        std::fs::remove_file(&path).ok();
    }
}
