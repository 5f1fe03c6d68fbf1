//! Shutdown coordination for a deployed service instance.
//!
//! One [`Shutdown`] is created per deployment. The HTTP server and the
//! health monitor each hold a receiver; triggering stops both.

use tokio::sync::broadcast;

/// Broadcast stop request shared by the tasks of one deployment.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Resolve once [`trigger`](Self::trigger) is called.
    ///
    /// Subscribes immediately, so a trigger issued after this call returns
    /// is never missed.
    pub fn stopped(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // Closed also means stop: every sender is gone.
            let _ = rx.recv().await;
        }
    }

    /// Request a stop. Repeated calls are harmless.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening for the stop request.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
