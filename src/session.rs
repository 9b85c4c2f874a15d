//! Viewer session controller
//!
//! Owns the signaling channel and the current negotiator. When the monitor
//! reports a terminal ICE state, the stale peer connection is closed and a
//! fresh one negotiated over the same channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ViewerConfig;
use crate::rtc::{
    ConnectionStateMonitor, Indicator, IndicatorCallback, MediaSink, RestartRequest,
    SessionNegotiator, TransportFactory,
};
use crate::signaling::{SessionDescription, SignalingChannel, StreamRequest};

/// A viewing session, not yet started
pub struct ViewerSession {
    config: ViewerConfig,
    channel: SignalingChannel,
    factory: Arc<dyn TransportFactory>,
    sink: Arc<dyn MediaSink>,
    observer: IndicatorCallback,
}

impl ViewerSession {
    pub fn new<F>(
        config: ViewerConfig,
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn MediaSink>,
        observer: F,
    ) -> Self
    where
        F: Fn(Indicator) + Send + Sync + 'static,
    {
        let channel = SignalingChannel::new(config.signaling.clone(), config.channel_config());
        Self {
            config,
            channel,
            factory,
            sink,
            observer: Arc::new(observer),
        }
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    /// Open signaling and negotiate `request`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, request: StreamRequest) -> SessionHandle {
        info!(
            "Starting viewer session for stream '{}' ({})",
            request.stream, request.quality
        );
        self.channel.open();

        let (answer_tx, answer_rx) = mpsc::unbounded_channel();
        self.channel.on_description(move |description| {
            let _ = answer_tx.send(description);
        });

        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let generation = Arc::new(AtomicU64::new(0));
        let channel = self.channel.clone();

        let driver = Driver {
            session: self,
            request,
            restart_tx,
            generation: generation.clone(),
            negotiator: None,
            pending_send: Arc::new(Mutex::new(None)),
        };
        let task = tokio::spawn(driver.run(answer_rx, restart_rx, shutdown_rx));

        SessionHandle {
            shutdown: Some(shutdown_tx),
            task,
            generation,
            channel,
        }
    }
}

/// Handle to a running viewer session
pub struct SessionHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
    generation: Arc<AtomicU64>,
    channel: SignalingChannel,
}

impl SessionHandle {
    /// Number of peer connections replaced so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    /// Stop the session, closing the peer connection and signaling channel
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Session driver ended abnormally: {}", e);
        }
    }
}

struct Driver {
    session: ViewerSession,
    request: StreamRequest,
    restart_tx: mpsc::UnboundedSender<RestartRequest>,
    generation: Arc<AtomicU64>,
    negotiator: Option<SessionNegotiator>,
    /// Send task of the current generation's offer
    pending_send: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Driver {
    async fn run(
        mut self,
        mut answers: mpsc::UnboundedReceiver<SessionDescription>,
        mut restarts: mpsc::UnboundedReceiver<RestartRequest>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        self.negotiate().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(answer) = answers.recv() => self.apply_answer(answer).await,
                Some(request) = restarts.recv() => self.restart(request).await,
            }
        }

        self.teardown().await;
        self.session.channel.close();
        info!("Viewer session stopped");
    }

    /// Build the negotiator for the current generation and create its offer
    async fn negotiate(&mut self) {
        let generation = self.generation.load(Ordering::SeqCst);
        let monitor = ConnectionStateMonitor::new(
            generation,
            self.session.observer.clone(),
            self.restart_tx.clone(),
        );

        let negotiator = match SessionNegotiator::new(
            self.session.factory.as_ref(),
            &self.session.config.stun_servers,
            monitor,
            self.session.sink.clone(),
        )
        .await
        {
            Ok(negotiator) => negotiator,
            Err(e) => {
                error!("Failed to create peer connection: {}", e);
                return;
            }
        };

        let channel = self.session.channel.clone();
        let request = self.request.clone();
        let pending_send = self.pending_send.clone();
        negotiator.on_local_description_ready(move |description| {
            let channel = channel.clone();
            let request = request.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = channel.send_description(description, &request).await {
                    warn!("Failed to send session description: {}", e);
                }
            });
            *pending_send.lock() = Some(task);
        });

        if let Err(e) = negotiator.create_offer().await {
            warn!("Negotiation {} stalled: {}", generation, e);
        }

        self.negotiator = Some(negotiator);
    }

    async fn apply_answer(&mut self, answer: SessionDescription) {
        let Some(negotiator) = &self.negotiator else {
            warn!("Ignoring session description, no active negotiation");
            return;
        };

        if let Err(e) = negotiator.set_remote_description(answer).await {
            warn!("Ignoring session description: {}", e);
        }
    }

    async fn restart(&mut self, request: RestartRequest) {
        let generation = self.generation.load(Ordering::SeqCst);
        if request.generation != generation {
            debug!(
                "Ignoring restart request for stale generation {}",
                request.generation
            );
            return;
        }

        warn!(
            "Peer connection {} ({}), restarting...",
            generation, request.state
        );
        self.teardown().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.session.config.restart_delay()).await;
        self.negotiate().await;
    }

    /// Drop the current peer connection and any offer still waiting to be sent
    async fn teardown(&mut self) {
        if let Some(task) = self.pending_send.lock().take() {
            task.abort();
        }

        if let Some(negotiator) = self.negotiator.take() {
            if let Err(e) = negotiator.close().await {
                debug!("Error closing peer connection: {}", e);
            }
        }
    }
}
