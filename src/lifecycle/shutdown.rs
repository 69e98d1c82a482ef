//! Shutdown coordination for the gateway.

use std::sync::Arc;

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel, so a task that subscribes after the trigger
/// still observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to long-running tasks.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered, or once every
    /// [`Shutdown`] handle has been dropped.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            // An Err means the sender is gone, which counts as shutdown too.
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
