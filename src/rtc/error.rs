//! Peer connection error types

use thiserror::Error;

use super::negotiator::NegotiationState;
use crate::signaling::SdpType;

/// Errors that can occur while negotiating a peer connection
#[derive(Error, Debug)]
pub enum RtcError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation not allowed in negotiation state {0:?}")]
    InvalidState(NegotiationState),

    #[error("Expected an answer, got {0}")]
    UnexpectedDescription(SdpType),

    #[error("Transport has no local description")]
    NoLocalDescription,

    #[error("Peer connection closed")]
    Closed,
}

impl From<webrtc::Error> for RtcError {
    fn from(e: webrtc::Error) -> Self {
        RtcError::Transport(e.to_string())
    }
}
