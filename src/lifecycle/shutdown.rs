//! Shutdown coordination for the broker.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What started the wind-down. Carried on the shutdown channel so the
/// server can log it before cancelling pending records and closing
/// sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An operator signal (Ctrl+C).
    Signal,
    /// An internal fault made continuing pointless.
    Fault,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => write!(f, "signal"),
            ShutdownReason::Fault => write!(f, "fault"),
        }
    }
}

/// Coordinator for graceful shutdown.
///
/// Fans the first trigger out to every long-running task: the serve loop
/// (which winds down the engine), the maintenance tickers, and the signal
/// listener. Only the first trigger broadcasts; callers learn whether they
/// started the wind-down or arrived late, which is how a repeated Ctrl+C
/// escalates to a forced exit.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownReason>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.tx.subscribe()
    }

    /// Start the wind-down for the given reason.
    ///
    /// Returns true when this call was the one that started it; later calls
    /// change nothing and get false back.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(reason);
        true
    }

    /// Whether the wind-down has started.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
