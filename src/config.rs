//! Viewer configuration
//!
//! All values have defaults matching a stock streaming server, so an empty
//! TOML document is a valid configuration:
//!
//! ```toml
//! stun_servers = ["stun:stun.l.google.com:19302"]
//! restart_delay_ms = 1000
//!
//! [signaling]
//! host = "stream.example.org"
//! secure = true
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signaling::{ChannelConfig, SignalingEndpoint, RECONNECT_DELAY, SEND_RETRY_INTERVAL};

/// STUN server used when none is configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Delay between closing a failed peer connection and creating its replacement
pub const RESTART_DELAY: Duration = Duration::from_millis(1000);

const ICE_URL_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

/// Errors raised while loading a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    /// STUN/TURN server URLs handed to the peer connection
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    #[serde(default)]
    pub signaling: SignalingEndpoint,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_send_retry_interval_ms")]
    pub send_retry_interval_ms: u64,

    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

fn default_stun_servers() -> Vec<String> {
    vec![DEFAULT_STUN_SERVER.to_string()]
}

fn default_reconnect_delay_ms() -> u64 {
    RECONNECT_DELAY.as_millis() as u64
}

fn default_send_retry_interval_ms() -> u64 {
    SEND_RETRY_INTERVAL.as_millis() as u64
}

fn default_restart_delay_ms() -> u64 {
    RESTART_DELAY.as_millis() as u64
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
            signaling: SignalingEndpoint::default(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            send_retry_interval_ms: default_send_retry_interval_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl ViewerConfig {
    /// Validate the configuration values
    ///
    /// Returns an error message if any value is invalid.
    pub fn validate(&self) -> Result<(), String> {
        for url in &self.stun_servers {
            if !ICE_URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(format!(
                    "Invalid ICE server URL: {}. Must start with stun:, stuns:, turn: or turns:",
                    url
                ));
            }
        }

        if self.signaling.host.is_empty() {
            return Err("Signaling host must not be empty".to_string());
        }

        if !self.signaling.path.starts_with('/') {
            return Err(format!(
                "Invalid signaling path: {}. Must start with /",
                self.signaling.path
            ));
        }

        if self.reconnect_delay_ms == 0
            || self.send_retry_interval_ms == 0
            || self.restart_delay_ms == 0
        {
            return Err("Delays must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(content)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            send_retry_interval: Duration::from_millis(self.send_retry_interval_ms),
        }
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
