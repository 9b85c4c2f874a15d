//! Shared test helpers: a scripted peer transport and a local signaling server

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use ghostream_viewer::rtc::{
    ConnectionState, InboundTrack, MediaSink, PeerTransport, RtcError, TrackKind, TransportEvent,
    TransportFactory,
};
use ghostream_viewer::SessionDescription;

/// Find an available port for testing
pub fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Peer transport driven by the test instead of a network
pub struct MockTransport {
    id: usize,
    events: mpsc::UnboundedSender<TransportEvent>,
    fail_offer: bool,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    gathered: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn offer_sdp(&self) -> String {
        format!(
            "v=0\r\no=- {} 1 IN IP4 127.0.0.1\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n",
            self.id
        )
    }

    pub fn emit(&self, event: TransportEvent) {
        self.events.send(event).expect("negotiator event loop gone");
    }

    /// Report one host candidate, then end-of-candidates
    pub fn complete_gathering(&self) {
        self.gathered.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::IceCandidate(Some(
            "candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host".to_string(),
        )));
        self.emit(TransportEvent::IceCandidate(None));
    }

    pub fn report_state(&self, state: ConnectionState) {
        self.emit(TransportEvent::IceConnectionStateChange(state));
    }

    pub fn report_track(&self, kind: TrackKind) {
        self.emit(TransportEvent::Track(InboundTrack {
            kind,
            track_id: format!("{}-track", kind),
            stream_id: "ghostream".to_string(),
            remote: None,
        }));
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        if self.fail_offer {
            return Err(RtcError::Transport("offer rejected".to_string()));
        }
        Ok(SessionDescription::offer(self.offer_sdp()))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.local.lock().clone()?;
        if self.gathered.load(Ordering::SeqCst) {
            Some(SessionDescription::offer(format!(
                "{}a=candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host\r\n",
                local.sdp()
            )))
        } else {
            Some(local)
        }
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        if self.is_closed() {
            return Err(RtcError::Closed);
        }
        let mut remote = self.remote.lock();
        if remote.is_some() {
            return Err(RtcError::Transport("remote description already set".to_string()));
        }
        *remote = Some(description);
        Ok(())
    }

    async fn close(&self) -> Result<(), RtcError> {
        self.closed.store(true, Ordering::SeqCst);
        // A real peer connection reports its own closure
        let _ = self
            .events
            .send(TransportEvent::IceConnectionStateChange(ConnectionState::Closed));
        Ok(())
    }
}

/// Factory recording every transport it builds
#[derive(Default)]
pub struct MockFactory {
    pub fail_offer: bool,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    ice_servers: Mutex<Vec<Vec<String>>>,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn failing_offers() -> Self {
        Self {
            fail_offer: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        self.transports.lock()[index].clone()
    }

    pub fn latest(&self) -> Arc<MockTransport> {
        self.transports
            .lock()
            .last()
            .cloned()
            .expect("no transport created")
    }

    pub fn ice_servers(&self) -> Vec<Vec<String>> {
        self.ice_servers.lock().clone()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(
        &self,
        ice_servers: &[String],
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>, RtcError> {
        let transport = Arc::new(MockTransport {
            id: self.created.load(Ordering::SeqCst),
            events,
            fail_offer: self.fail_offer,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            gathered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.ice_servers.lock().push(ice_servers.to_vec());
        self.transports.lock().push(transport.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(transport as Arc<dyn PeerTransport>)
    }
}

/// Sink recording attached tracks
#[derive(Default)]
pub struct RecordingSink {
    pub tracks: Mutex<Vec<InboundTrack>>,
}

impl MediaSink for RecordingSink {
    fn attach(&self, track: InboundTrack) {
        self.tracks.lock().push(track);
    }
}

/// How the test signaling server treats each connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Answer every offer with `{"type":"answer","sdp":"v=0 answer-N"}`
    Answer,
    /// Close every connection right after the handshake
    CloseImmediately,
}

/// Local signaling server
pub struct TestServer {
    pub port: u16,
    pub connections: Arc<AtomicUsize>,
    pub messages: mpsc::UnboundedReceiver<String>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(port: u16, mode: ServerMode) -> Self {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("Failed to bind test server");
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, messages) = mpsc::unbounded_channel();

        let counter = connections.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();

                tokio::spawn(async move {
                    if mode == ServerMode::CloseImmediately {
                        let _ = ws.close(None).await;
                        return;
                    }

                    let mut answered = 0;
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            let _ = tx.send(text.to_string());
                            let answer = format!(
                                r#"{{"type":"answer","sdp":"v=0 answer-{}-{}"}}"#,
                                index, answered
                            );
                            answered += 1;
                            if ws.send(Message::Text(answer)).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self {
            port,
            connections,
            messages,
            handle,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait for the next message the server received
    pub async fn next_message(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.messages.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
