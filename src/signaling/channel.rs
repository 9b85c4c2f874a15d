//! Self-healing signaling channel
//!
//! Keeps a WebSocket to the streaming server open, reconnecting after a
//! fixed delay whenever the connection closes or errors. Callers never see
//! transport drops: sends wait for the channel to become ready and inbound
//! descriptions are dispatched to a single registered handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::endpoint::SignalingEndpoint;
use super::error::SignalingError;
use super::message::{SessionDescription, SignalingMessage, StreamRequest};

/// Delay between a close/error and the next connection attempt
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Poll interval while a send waits for the channel to become ready
pub const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Channel timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub reconnect_delay: Duration,
    pub send_retry_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            send_retry_interval: SEND_RETRY_INTERVAL,
        }
    }
}

/// Handler for descriptions received from the server
pub type DescriptionCallback = Box<dyn Fn(SessionDescription) + Send + Sync + 'static>;

/// Text frame queued for the current connection, acknowledged once written
struct Outbound {
    text: String,
    written: oneshot::Sender<()>,
}

/// State shared with the connection task
struct Link {
    /// Writer of the live connection; replaced on every reconnect
    writer: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    handler: Mutex<Option<Arc<DescriptionCallback>>>,
    closed: AtomicBool,
}

impl Link {
    fn dispatch(&self, text: &str) {
        debug!("Message from server: {}", text);

        let description = match SessionDescription::from_json(text) {
            Ok(description) => description,
            Err(e) => {
                warn!("Dropping malformed session description: {}", e);
                return;
            }
        };

        // Clone out so the handler runs without the lock held
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(description),
            None => debug!("No description handler registered, dropping message"),
        }
    }
}

struct Inner {
    endpoint: SignalingEndpoint,
    config: ChannelConfig,
    link: Arc<Link>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Reconnecting duplex channel to the signaling server
///
/// Cloning is cheap; all clones share the same underlying connection.
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<Inner>,
}

impl SignalingChannel {
    /// Create a channel for `endpoint`; nothing connects until [`open`](Self::open)
    pub fn new(endpoint: SignalingEndpoint, config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                link: Arc::new(Link {
                    writer: Mutex::new(None),
                    handler: Mutex::new(None),
                    closed: AtomicBool::new(false),
                }),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn endpoint(&self) -> &SignalingEndpoint {
        &self.inner.endpoint
    }

    /// Start the connection task
    ///
    /// The task reconnects forever with a fixed delay. Calling `open` on an
    /// already opened or closed channel does nothing.
    pub fn open(&self) {
        let mut task = self.inner.task.lock();
        if task.is_some() || self.inner.link.closed.load(Ordering::SeqCst) {
            return;
        }

        let url = self.inner.endpoint.url();
        info!("Opening signaling channel to {}", url);
        *task = Some(tokio::spawn(run_connection(
            url,
            self.inner.config.reconnect_delay,
            self.inner.link.clone(),
        )));
    }

    /// Whether a connection is currently established
    pub fn is_ready(&self) -> bool {
        self.inner
            .link
            .writer
            .lock()
            .as_ref()
            .is_some_and(|writer| !writer.is_closed())
    }

    /// Send a local description for `request` to the server
    ///
    /// Waits for the channel to become ready, polling every
    /// `send_retry_interval`. Resolves once the frame has been written to a
    /// live connection; a connection lost before the write is retried on the
    /// next one. Fails only when the channel is closed.
    pub async fn send_description(
        &self,
        description: SessionDescription,
        request: &StreamRequest,
    ) -> Result<(), SignalingError> {
        let payload = serde_json::to_string(&SignalingMessage::new(description, request))?;

        loop {
            if self.inner.link.closed.load(Ordering::SeqCst) {
                return Err(SignalingError::Closed);
            }

            let writer = self.inner.link.writer.lock().clone();
            if let Some(writer) = writer {
                let (written, ack) = oneshot::channel();
                let queued = writer
                    .send(Outbound {
                        text: payload.clone(),
                        written,
                    })
                    .is_ok();
                if queued && ack.await.is_ok() {
                    info!("Sent session description to server");
                    return Ok(());
                }
            } else {
                debug!("Waiting for signaling channel to send data...");
            }

            tokio::time::sleep(self.inner.config.send_retry_interval).await;
        }
    }

    /// Register the handler for inbound session descriptions
    ///
    /// Replaces any previous handler. Messages that fail to parse are logged
    /// and dropped without reaching the handler.
    pub fn on_description<F>(&self, callback: F)
    where
        F: Fn(SessionDescription) + Send + Sync + 'static,
    {
        *self.inner.link.handler.lock() = Some(Arc::new(Box::new(callback)));
    }

    /// Stop reconnecting and fail pending sends
    pub fn close(&self) {
        self.inner.link.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        self.inner.link.writer.lock().take();
        info!("Signaling channel to {} closed", self.inner.endpoint);
    }
}

async fn run_connection(url: String, reconnect_delay: Duration, link: Arc<Link>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => {
                info!("Signaling channel opened");
                serve(ws_stream, &link).await;
                info!(
                    "Signaling channel closed, retrying connection in {:?}...",
                    reconnect_delay
                );
            }
            Err(e) => {
                warn!(
                    "Signaling channel errored ({}), retrying connection in {:?}...",
                    e, reconnect_delay
                );
            }
        }

        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Pump one connection until it closes or errors
async fn serve(ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>, link: &Link) {
    let (mut sink, mut stream) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    *link.writer.lock() = Some(tx);

    loop {
        tokio::select! {
            Some(outbound) = rx.recv() => {
                if let Err(e) = sink.send(Message::Text(outbound.text)).await {
                    warn!("Signaling send failed: {}", e);
                    break;
                }
                let _ = outbound.written.send(());
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => link.dispatch(&text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("Signaling receive failed: {}", e);
                    break;
                }
            }
        }
    }

    link.writer.lock().take();
}
