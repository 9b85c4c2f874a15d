//! Signaling error types

use thiserror::Error;

/// Errors that can occur on the signaling channel
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Signaling channel closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid signaling endpoint: {0}")]
    InvalidEndpoint(String),
}
