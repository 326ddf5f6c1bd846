//! # Group Configuration
//!
//! Genesis descriptor loaded once at boot.
//!
//! ## Config File Format
//!
//! ```toml
//! group-size = 1
//! loop-wait-duration = 1000000000
//!
//! [app]
//! client-id = "2c8a2d74-1f4c-4c9a-9a0e-1d3e8a8f6d11"
//! session-id = "b8f0f5a4-7f39-4d0c-8d8b-cf3c7a0f2f0e"
//! private-key = "..."
//! pin-token = "..."
//! pin = "123456"
//!
//! [genesis]
//! members = ["2c8a2d74-1f4c-4c9a-9a0e-1d3e8a8f6d11"]
//! threshold = 1
//! timestamp = 1640995200000000000
//!
//! [engine]
//! drain-batch = 500
//! actions-batch = 16
//! dedup-capacity = 262144
//! drain-retry-delay-ms = 3000
//! ```
//!
//! Durations and the genesis timestamp are nanoseconds. `MTG_APP_PIN`
//! overrides `app.pin` when loading from a file.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{from_nanos, OUTPUTS_BATCH_SIZE};

/// Environment variable overriding the PIN.
pub const PIN_ENV_VAR: &str = "MTG_APP_PIN";

/// Errors that can occur during config loading.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// File I/O error.
    #[error("Failed to read {path}: {error}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// Error message from the I/O operation.
        error: String,
    },
    /// TOML parsing error.
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// Parsed but unusable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Member credentials.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    /// This member's identity.
    pub client_id: Uuid,
    /// API session.
    #[serde(default)]
    pub session_id: String,
    /// API signing key.
    #[serde(default)]
    pub private_key: String,
    /// Encrypted PIN token.
    #[serde(default)]
    pub pin_token: String,
    /// Signing PIN.
    #[serde(default)]
    pub pin: String,
}

/// Founding membership.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GenesisConfig {
    /// Founding members.
    pub members: Vec<Uuid>,
    /// Signing threshold.
    pub threshold: usize,
    /// Genesis time, nanoseconds since the UNIX epoch.
    pub timestamp: u64,
}

/// Engine tuning. Every field has a default.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    /// Feed page size.
    pub drain_batch: usize,
    /// Actions dispatched per tick.
    pub actions_batch: usize,
    /// Capacity of the drain dedup cache.
    pub dedup_capacity: usize,
    /// Pause after a failed drain.
    pub drain_retry_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            drain_batch: 500,
            actions_batch: 16,
            dedup_capacity: 262_144,
            drain_retry_delay_ms: 3_000,
        }
    }
}

impl EngineSettings {
    /// Pause after a failed drain.
    pub fn drain_retry_delay(&self) -> Duration {
        Duration::from_millis(self.drain_retry_delay_ms)
    }
}

/// Full group configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct GroupConfig {
    /// Member credentials.
    pub app: AppConfig,
    /// Founding membership.
    pub genesis: GenesisConfig,
    /// Minimum inputs per spend; zero or negative means a full batch.
    #[serde(default)]
    pub group_size: i64,
    /// Pause between ticks, nanoseconds.
    #[serde(default)]
    pub loop_wait_duration: u64,
    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineSettings,
}

impl GroupConfig {
    /// Load configuration from a TOML file, applying `MTG_APP_PIN`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_pin_override(std::env::var(PIN_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Replace the PIN when `pin` is non-empty.
    pub fn apply_pin_override(&mut self, pin: Option<String>) {
        if let Some(pin) = pin.filter(|p| !p.is_empty()) {
            self.app.pin = pin;
        }
    }

    /// Check the genesis descriptor and credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.genesis;
        if g.threshold < 1 || g.threshold > g.members.len() || g.threshold > u8::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "invalid group threshold {} {}",
                g.members.len(),
                g.threshold
            )));
        }
        if g.members.iter().any(Uuid::is_nil) {
            return Err(ConfigError::Invalid("nil member id".to_string()));
        }
        if !g.members.contains(&self.app.client_id) {
            return Err(ConfigError::Invalid(format!(
                "app {} not belongs to the group",
                self.app.client_id
            )));
        }
        if self.app.pin.is_empty() {
            return Err(ConfigError::Invalid("empty pin".to_string()));
        }
        Ok(())
    }

    /// Effective minimum inputs per spend.
    pub fn group_size(&self) -> usize {
        if self.group_size <= 0 {
            OUTPUTS_BATCH_SIZE
        } else {
            self.group_size as usize
        }
    }

    /// Pause between ticks.
    pub fn loop_wait(&self) -> Duration {
        Duration::from_nanos(self.loop_wait_duration)
    }

    /// Genesis time.
    pub fn genesis_time(&self) -> chrono::DateTime<chrono::Utc> {
        from_nanos(self.genesis.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBER: &str = "2c8a2d74-1f4c-4c9a-9a0e-1d3e8a8f6d11";

    fn sample(extra: &str) -> String {
        format!(
            r#"
{extra}
[app]
client-id = "{MEMBER}"
pin = "123456"

[genesis]
members = ["{MEMBER}", "b8f0f5a4-7f39-4d0c-8d8b-cf3c7a0f2f0e"]
threshold = 2
timestamp = 1640995200000000000
"#
        )
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = GroupConfig::parse(&sample("")).unwrap();
        assert_eq!(config.genesis.threshold, 2);
        assert_eq!(config.group_size(), OUTPUTS_BATCH_SIZE);
        assert_eq!(config.loop_wait(), Duration::ZERO);
        assert_eq!(config.engine, EngineSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_top_level_keys() {
        let config =
            GroupConfig::parse(&sample("group-size = 3\nloop-wait-duration = 5000000")).unwrap();
        assert_eq!(config.group_size(), 3);
        assert_eq!(config.loop_wait(), Duration::from_millis(5));
    }

    #[test]
    fn test_engine_section_partial() {
        let text = format!("{}\n[engine]\ndrain-batch = 10\n", sample(""));
        let config = GroupConfig::parse(&text).unwrap();
        assert_eq!(config.engine.drain_batch, 10);
        assert_eq!(config.engine.actions_batch, 16);
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = GroupConfig::parse(&sample("")).unwrap();
        config.genesis.threshold = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.genesis.threshold = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_client_must_be_member() {
        let mut config = GroupConfig::parse(&sample("")).unwrap();
        config.app.client_id = Uuid::new_v4();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not belongs to the group"));
    }

    #[test]
    fn test_pin_override() {
        let mut config = GroupConfig::parse(&sample("")).unwrap();
        config.apply_pin_override(Some(String::new()));
        assert_eq!(config.app.pin, "123456");
        config.apply_pin_override(Some("654321".to_string()));
        assert_eq!(config.app.pin, "654321");
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            GroupConfig::parse("[app"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GroupConfig::load("/nonexistent/mtg.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
