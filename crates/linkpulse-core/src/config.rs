//! Engine configuration.
//!
//! [`EngineConfigInput`] is the loosely-typed form read from TOML, where
//! every key is optional. [`EngineConfigInput::resolve`] fills defaults and
//! validates, producing an [`EngineConfig`].
//!
//! ```toml
//! endpoint = "ws://localhost:8888/ws"
//! window_capacity = 3000
//! tick_interval_ms = 32
//! reconnect_delay_ms = 1000
//! receiving_hold_ms = 100
//! disconnect_timeout_ms = 5000
//! loss_history_size = 3
//! high_loss_threshold_percent = 20.0
//! low_loss_threshold_percent = 5.0
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::lifecycle::{DEFAULT_RECEIVING_HOLD, DEFAULT_RECONNECT_DELAY};
use crate::quality::QualityConfig;
use crate::watchdog::DEFAULT_DISCONNECT_TIMEOUT;
use crate::window::DEFAULT_CAPACITY;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8888/ws";
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(32);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfigInput {
    pub endpoint: Option<String>,
    pub window_capacity: Option<usize>,
    pub tick_interval_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
    pub receiving_hold_ms: Option<u64>,
    pub disconnect_timeout_ms: Option<u64>,
    pub loss_history_size: Option<usize>,
    pub high_loss_threshold_percent: Option<f64>,
    pub low_loss_threshold_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// WebSocket URL of the stats relay.
    pub endpoint: String,
    pub window_capacity: usize,
    /// Period of the gap-appending tick.
    pub tick_interval: Duration,
    pub reconnect_delay: Duration,
    /// How long the receiving flag stays up after a sample.
    pub receiving_hold: Duration,
    pub disconnect_timeout: Duration,
    pub quality: QualityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            window_capacity: DEFAULT_CAPACITY,
            tick_interval: DEFAULT_TICK_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            receiving_hold: DEFAULT_RECEIVING_HOLD,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            quality: QualityConfig::default(),
        }
    }
}

impl EngineConfigInput {
    pub fn resolve(self) -> Result<EngineConfig, ConfigError> {
        let defaults = EngineConfig::default();
        let ms = |v: Option<u64>, default: Duration| v.map(Duration::from_millis).unwrap_or(default);

        let config = EngineConfig {
            endpoint: self
                .endpoint
                .map(|e| e.trim().to_string())
                .unwrap_or(defaults.endpoint),
            window_capacity: self.window_capacity.unwrap_or(defaults.window_capacity),
            tick_interval: ms(self.tick_interval_ms, defaults.tick_interval),
            reconnect_delay: ms(self.reconnect_delay_ms, defaults.reconnect_delay),
            receiving_hold: ms(self.receiving_hold_ms, defaults.receiving_hold),
            disconnect_timeout: ms(self.disconnect_timeout_ms, defaults.disconnect_timeout),
            quality: QualityConfig {
                history_size: self
                    .loss_history_size
                    .unwrap_or(defaults.quality.history_size),
                high_threshold_percent: self
                    .high_loss_threshold_percent
                    .unwrap_or(defaults.quality.high_threshold_percent),
                low_threshold_percent: self
                    .low_loss_threshold_percent
                    .unwrap_or(defaults.quality.low_threshold_percent),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(EngineConfig::default());
        }
        let parsed: EngineConfigInput = toml::from_str(input)?;
        parsed.resolve()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::invalid(
                "endpoint",
                format!("{:?} is not a ws:// or wss:// URL", self.endpoint),
            ));
        }
        if self.window_capacity == 0 {
            return Err(ConfigError::invalid("window_capacity", "must be at least 1"));
        }
        if self.quality.history_size == 0 {
            return Err(ConfigError::invalid("loss_history_size", "must be at least 1"));
        }
        for (field, d) in [
            ("tick_interval_ms", self.tick_interval),
            ("reconnect_delay_ms", self.reconnect_delay),
            ("receiving_hold_ms", self.receiving_hold),
            ("disconnect_timeout_ms", self.disconnect_timeout),
        ] {
            if d.is_zero() {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        let high = self.quality.high_threshold_percent;
        let low = self.quality.low_threshold_percent;
        for (field, v) in [
            ("high_loss_threshold_percent", high),
            ("low_loss_threshold_percent", low),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(ConfigError::invalid(field, format!("{v} is outside 0-100")));
            }
        }
        if low > high {
            return Err(ConfigError::invalid(
                "low_loss_threshold_percent",
                format!("{low} is above the high threshold {high}"),
            ));
        }
        Ok(())
    }
}
