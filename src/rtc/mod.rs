//! Peer connection module
//!
//! Drives the offer/answer handshake of a receive-only viewer and maps ICE
//! connectivity to indicator categories and restart requests.

mod error;
mod monitor;
mod negotiator;
mod transport;
mod webrtc_transport;

pub use error::RtcError;
pub use monitor::{ConnectionStateMonitor, Indicator, IndicatorCallback, RestartRequest};
pub use negotiator::{NegotiationState, SendDescriptionFn, SessionNegotiator};
pub use transport::{
    ConnectionState, InboundTrack, MediaSink, PeerTransport, TrackKind, TransportEvent,
    TransportFactory,
};
pub use webrtc_transport::{WebRtcTransport, WebRtcTransportFactory};
