//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

/// Coordinator for cooperative shutdown.
///
/// Combines a sticky "requested" flag, checked at loop-iteration
/// granularity, with a broadcast channel that wakes sleeping tasks early.
#[derive(Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
            requested: self.requested.clone(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`Shutdown`].
pub struct ShutdownListener {
    rx: broadcast::Receiver<()>,
    requested: Arc<AtomicBool>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless shutdown is triggered first.
    ///
    /// Returns `true` if shutdown was requested. A dropped coordinator
    /// counts as a shutdown request.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_triggered(),
            res = self.rx.recv() => {
                if let Err(broadcast::error::RecvError::Closed) = res {
                    self.requested.store(true, Ordering::SeqCst);
                }
                self.is_triggered()
            }
        }
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&mut self) {
        while !self.is_triggered() {
            if let Err(broadcast::error::RecvError::Closed) = self.rx.recv().await {
                self.requested.store(true, Ordering::SeqCst);
            }
        }
    }
}
