//! ICE connection state monitor
//!
//! Maps transport connectivity to the three indicator categories shown to
//! the user and asks the owning session for a restart on terminal states.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::transport::ConnectionState;

/// Connectivity category pushed to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Connecting,
    Connected,
    Error,
}

impl Indicator {
    /// Category for a transport state; `New` has none
    pub fn from_state(state: ConnectionState) -> Option<Self> {
        match state {
            ConnectionState::New => None,
            ConnectionState::Checking | ConnectionState::Disconnected => {
                Some(Indicator::Connecting)
            }
            ConnectionState::Connected => Some(Indicator::Connected),
            ConnectionState::Failed | ConnectionState::Closed => Some(Indicator::Error),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Connecting => write!(f, "connecting"),
            Indicator::Connected => write!(f, "connected"),
            Indicator::Error => write!(f, "error"),
        }
    }
}

/// Indicator observer
pub type IndicatorCallback = Arc<dyn Fn(Indicator) + Send + Sync + 'static>;

/// Request to tear down and recreate the peer connection of `generation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub generation: u64,
    pub state: ConnectionState,
}

/// Observes one peer connection's ICE state
pub struct ConnectionStateMonitor {
    generation: u64,
    observer: IndicatorCallback,
    restart: mpsc::UnboundedSender<RestartRequest>,
    last: Mutex<Option<Indicator>>,
    restart_requested: AtomicBool,
}

impl ConnectionStateMonitor {
    pub fn new(
        generation: u64,
        observer: IndicatorCallback,
        restart: mpsc::UnboundedSender<RestartRequest>,
    ) -> Self {
        Self {
            generation,
            observer,
            restart,
            last: Mutex::new(None),
            restart_requested: AtomicBool::new(false),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last category pushed to the observer
    pub fn indicator(&self) -> Option<Indicator> {
        *self.last.lock()
    }

    /// Handle an ICE connection state change
    ///
    /// The observer only sees category changes. The first terminal state
    /// sends a single restart request; later ones are ignored.
    pub fn observe(&self, state: ConnectionState) {
        info!("ICE connection state changed to {}", state);

        if let Some(indicator) = Indicator::from_state(state) {
            let changed = {
                let mut last = self.last.lock();
                let changed = *last != Some(indicator);
                *last = Some(indicator);
                changed
            };
            if changed {
                (self.observer)(indicator);
            }
        }

        if state.is_terminal() && !self.restart_requested.swap(true, Ordering::SeqCst) {
            warn!("Connection {}, restarting...", state);
            let request = RestartRequest {
                generation: self.generation,
                state,
            };
            if self.restart.send(request).is_err() {
                debug!("Session is gone, dropping restart request");
            }
        }
    }
}
