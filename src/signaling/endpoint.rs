//! Signaling endpoint configuration

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::SignalingError;

/// Path of the signaling WebSocket on the streaming server
pub const DEFAULT_SIGNALING_PATH: &str = "/_ws/";

/// Location of the signaling WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingEndpoint {
    /// Host with optional port, e.g. `example.org:8080`
    pub host: String,
    /// Use `wss://` instead of `ws://`
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    DEFAULT_SIGNALING_PATH.to_string()
}

impl SignalingEndpoint {
    pub fn new(host: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            secure,
            path: default_path(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Parse an origin or full URL
    ///
    /// `https://` and `wss://` select the secure scheme. A missing or root
    /// path falls back to [`DEFAULT_SIGNALING_PATH`].
    pub fn parse(url: &str) -> Result<Self, SignalingError> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(SignalingError::InvalidEndpoint(format!(
                "{}: expected ws://, wss://, http:// or https://",
                url
            )));
        };

        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        if host.is_empty() {
            return Err(SignalingError::InvalidEndpoint(format!("{}: missing host", url)));
        }

        let path = if path.is_empty() || path == "/" {
            default_path()
        } else {
            path.to_string()
        };

        Ok(Self {
            host: host.to_string(),
            secure,
            path,
        })
    }

    /// WebSocket URL of the endpoint
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, self.path)
    }
}

impl Default for SignalingEndpoint {
    fn default() -> Self {
        Self::new("localhost:8080", false)
    }
}

impl fmt::Display for SignalingEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}
