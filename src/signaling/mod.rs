//! Signaling module
//!
//! Self-healing WebSocket channel used to exchange session descriptions
//! with the streaming server.

mod channel;
mod endpoint;
mod error;
mod message;

pub use channel::{
    ChannelConfig, DescriptionCallback, SignalingChannel, RECONNECT_DELAY, SEND_RETRY_INTERVAL,
};
pub use endpoint::{SignalingEndpoint, DEFAULT_SIGNALING_PATH};
pub use error::SignalingError;
pub use message::{SdpType, SessionDescription, SignalingMessage, StreamRequest};
