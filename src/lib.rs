//! ghostream-viewer - WebRTC viewer sessions for streaming servers
//!
//! This library negotiates a receive-only audio/video WebRTC session with a
//! server over a self-healing WebSocket signaling channel, and recreates the
//! peer connection whenever ICE connectivity is lost for good.

pub mod config;
pub mod rtc;
pub mod session;
pub mod signaling;

pub use config::{ConfigError, ViewerConfig};
pub use rtc::{ConnectionState, Indicator, SessionNegotiator, WebRtcTransportFactory};
pub use session::{SessionHandle, ViewerSession};
pub use signaling::{SessionDescription, SignalingChannel, SignalingEndpoint, StreamRequest};
