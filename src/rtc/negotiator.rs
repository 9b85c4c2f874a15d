//! Offer/answer negotiation for a single peer connection
//!
//! A negotiator runs exactly one handshake:
//!
//! ```text
//! Idle -> OfferCreated -> CandidatesGathered -> AnswerApplied
//! ```
//!
//! The local description is handed to the send function only once the
//! transport reports end-of-candidates, so the server always receives a
//! complete (non-trickled) offer. `Failed` and `Closed` are entered only
//! when the transport reports them.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::RtcError;
use super::monitor::ConnectionStateMonitor;
use super::transport::{
    ConnectionState, InboundTrack, MediaSink, PeerTransport, TrackKind, TransportEvent,
    TransportFactory,
};
use crate::signaling::{SdpType, SessionDescription};

/// Receives the complete local description
pub type SendDescriptionFn = Box<dyn Fn(SessionDescription) + Send + Sync + 'static>;

/// Progress of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferCreated,
    /// Gathering finished and the local description was handed off
    CandidatesGathered,
    AnswerApplied,
    Failed,
    Closed,
}

struct Gate {
    state: NegotiationState,
    offer_pending: bool,
    gathering_complete: bool,
    send_fn: Option<Arc<SendDescriptionFn>>,
}

impl Gate {
    fn ready_to_send(&self) -> bool {
        self.state == NegotiationState::OfferCreated
            && self.gathering_complete
            && self.send_fn.is_some()
    }
}

struct Shared {
    transport: Arc<dyn PeerTransport>,
    monitor: ConnectionStateMonitor,
    sink: Arc<dyn MediaSink>,
    gate: Mutex<Gate>,
}

impl Shared {
    /// Hand the local description off once every precondition holds
    async fn try_send_local_description(&self) {
        if !self.gate.lock().ready_to_send() {
            return;
        }

        let Some(description) = self.transport.local_description().await else {
            error!("{}", RtcError::NoLocalDescription);
            return;
        };

        // Re-check under the lock so concurrent callers send only once
        let send_fn = {
            let mut gate = self.gate.lock();
            if !gate.ready_to_send() {
                return;
            }
            gate.state = NegotiationState::CandidatesGathered;
            gate.send_fn.clone()
        };

        if let Some(send_fn) = send_fn {
            info!("Sending session description to server");
            send_fn(description);
        }
    }

    fn on_state_change(&self, state: ConnectionState) {
        {
            let mut gate = self.gate.lock();
            if gate.state == NegotiationState::Closed {
                debug!("Ignoring ICE state {} on closed peer connection", state);
                return;
            }
            match state {
                ConnectionState::Failed => gate.state = NegotiationState::Failed,
                ConnectionState::Closed => gate.state = NegotiationState::Closed,
                _ => {}
            }
        }
        self.monitor.observe(state);
    }

    fn on_track(&self, track: InboundTrack) {
        info!("New {} track", track.kind);
        match track.kind {
            TrackKind::Video => self.sink.attach(track),
            // Played through the transport's default output
            TrackKind::Audio => debug!("Audio track {} left to transport", track.track_id),
        }
    }
}

async fn run_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::IceCandidate(Some(candidate)) => {
                debug!("Gathered local ICE candidate: {}", candidate);
            }
            TransportEvent::IceCandidate(None) => {
                debug!("ICE candidate gathering complete");
                shared.gate.lock().gathering_complete = true;
                shared.try_send_local_description().await;
            }
            TransportEvent::IceConnectionStateChange(state) => shared.on_state_change(state),
            TransportEvent::Track(track) => shared.on_track(track),
        }
    }
}

/// Drives one offer/answer handshake over a [`PeerTransport`]
pub struct SessionNegotiator {
    shared: Arc<Shared>,
    events_task: JoinHandle<()>,
}

impl SessionNegotiator {
    /// Create the peer connection and start consuming its events
    pub async fn new(
        factory: &dyn TransportFactory,
        ice_servers: &[String],
        monitor: ConnectionStateMonitor,
        sink: Arc<dyn MediaSink>,
    ) -> Result<Self, RtcError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = factory.create(ice_servers, tx).await?;
        debug!(
            "Created peer connection (generation {}) with {} ICE server(s)",
            monitor.generation(),
            ice_servers.len()
        );

        let shared = Arc::new(Shared {
            transport,
            monitor,
            sink,
            gate: Mutex::new(Gate {
                state: NegotiationState::Idle,
                offer_pending: false,
                gathering_complete: false,
                send_fn: None,
            }),
        });
        let events_task = tokio::spawn(run_events(shared.clone(), rx));

        Ok(Self {
            shared,
            events_task,
        })
    }

    pub fn state(&self) -> NegotiationState {
        self.shared.gate.lock().state
    }

    pub fn monitor(&self) -> &ConnectionStateMonitor {
        &self.shared.monitor
    }

    /// Register the function that receives the complete local description
    ///
    /// It is invoked at most once, after candidate gathering completes.
    pub fn on_local_description_ready<F>(&self, send_fn: F)
    where
        F: Fn(SessionDescription) + Send + Sync + 'static,
    {
        let ready = {
            let mut gate = self.shared.gate.lock();
            gate.send_fn = Some(Arc::new(Box::new(send_fn)));
            gate.ready_to_send()
        };

        // Gathering may already be over
        if ready {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.try_send_local_description().await });
        }
    }

    /// Generate an offer and set it as the local description
    ///
    /// On failure the error is logged and returned, and nothing is sent for
    /// this attempt.
    pub async fn create_offer(&self) -> Result<(), RtcError> {
        {
            let mut gate = self.shared.gate.lock();
            if gate.state != NegotiationState::Idle || gate.offer_pending {
                return Err(RtcError::InvalidState(gate.state));
            }
            gate.offer_pending = true;
        }

        if let Err(e) = self.apply_offer().await {
            error!("Failed to create WebRTC offer: {}", e);
            self.shared.gate.lock().offer_pending = false;
            return Err(e);
        }

        {
            let mut gate = self.shared.gate.lock();
            gate.offer_pending = false;
            if gate.state != NegotiationState::Idle {
                return Err(RtcError::InvalidState(gate.state));
            }
            gate.state = NegotiationState::OfferCreated;
        }
        info!("WebRTC offer created");

        // End-of-candidates may have been seen before the state moved
        self.shared.try_send_local_description().await;
        Ok(())
    }

    async fn apply_offer(&self) -> Result<(), RtcError> {
        let offer = self.shared.transport.create_offer().await?;
        self.shared.transport.set_local_description(offer).await
    }

    /// Apply the server's answer
    ///
    /// Accepted once, after the local description was sent. Transport
    /// rejections are returned as is and not retried.
    pub async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        if description.sdp_type() != SdpType::Answer {
            return Err(RtcError::UnexpectedDescription(description.sdp_type()));
        }

        {
            let mut gate = self.shared.gate.lock();
            if gate.state != NegotiationState::CandidatesGathered {
                return Err(RtcError::InvalidState(gate.state));
            }
            gate.state = NegotiationState::AnswerApplied;
        }

        if let Err(e) = self.shared.transport.set_remote_description(description).await {
            warn!("Failed to apply remote description: {}", e);
            let mut gate = self.shared.gate.lock();
            if gate.state == NegotiationState::AnswerApplied {
                gate.state = NegotiationState::CandidatesGathered;
            }
            return Err(e);
        }

        info!("Remote description applied");
        Ok(())
    }

    /// Close the peer connection and stop observing it
    pub async fn close(&self) -> Result<(), RtcError> {
        // Stop events first so the close itself is not reported
        self.events_task.abort();
        self.shared.gate.lock().state = NegotiationState::Closed;
        self.shared.transport.close().await
    }
}

impl Drop for SessionNegotiator {
    fn drop(&mut self) {
        self.events_task.abort();
    }
}
