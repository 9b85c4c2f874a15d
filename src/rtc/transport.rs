//! Media transport abstraction
//!
//! The negotiator never touches ICE, DTLS or RTP itself. It drives a
//! [`PeerTransport`] and consumes the [`TransportEvent`]s it emits.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::track::track_remote::TrackRemote;

use super::error::RtcError;
use crate::signaling::SessionDescription;

/// ICE connectivity state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// The peer connection cannot recover from this state
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Media kind of an inbound track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Track received from the server
#[derive(Clone)]
pub struct InboundTrack {
    pub kind: TrackKind,
    pub track_id: String,
    pub stream_id: String,
    /// RTP source, present when backed by a real peer connection
    pub remote: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for InboundTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTrack")
            .field("kind", &self.kind)
            .field("track_id", &self.track_id)
            .field("stream_id", &self.stream_id)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// Event emitted by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was gathered; `None` signals end-of-candidates
    IceCandidate(Option<String>),
    IceConnectionStateChange(ConnectionState),
    Track(InboundTrack),
}

/// A peer connection as seen by the negotiator
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, RtcError>;

    /// Apply the local description; starts candidate gathering
    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), RtcError>;

    /// Current local description, including candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError>;

    async fn close(&self) -> Result<(), RtcError>;
}

/// Builds peer connections for new negotiations
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Create a peer connection with send/receive video and audio transceivers
    ///
    /// Every transport event must be delivered on `events`.
    async fn create(
        &self,
        ice_servers: &[String],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, RtcError>;
}

/// Output for the inbound video stream
pub trait MediaSink: Send + Sync {
    fn attach(&self, track: InboundTrack);
}
