//! Signaling wire messages
//!
//! The client sends `{"webRtcSdp": {...}, "stream": ..., "quality": ...}`
//! and the server replies with a bare session description.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::SignalingError;

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// Negotiation payload exchanged as offer/answer
///
/// Fields are private so a description cannot change once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    sdp_type: SdpType,
    sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn sdp_type(&self) -> SdpType {
        self.sdp_type
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }

    /// Parse a description from wire JSON
    ///
    /// Both `type` and `sdp` are required; anything else fails the parse.
    pub fn from_json(text: &str) -> Result<Self, SignalingError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Which server-side stream and quality tier to negotiate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub stream: String,
    pub quality: String,
}

impl StreamRequest {
    pub fn new(stream: impl Into<String>, quality: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            quality: quality.into(),
        }
    }
}

/// Client -> server signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMessage {
    pub web_rtc_sdp: SessionDescription,
    pub stream: String,
    pub quality: String,
}

impl SignalingMessage {
    pub fn new(description: SessionDescription, request: &StreamRequest) -> Self {
        Self {
            web_rtc_sdp: description,
            stream: request.stream.clone(),
            quality: request.quality.clone(),
        }
    }
}
