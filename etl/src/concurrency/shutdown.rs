//! Shutdown signaling between the process entry point and the indexing loop.

use tokio::sync::watch;

/// Sending half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests every subscribed receiver to stop.
    ///
    /// Calling it more than once is harmless.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown was requested, or when the sender is dropped.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|requested| *requested).await;
    }
}

/// Creates a shutdown channel in the "running" state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_after_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown();
        rx.wait().await;

        assert!(rx.is_shutdown());
        assert!(tx.subscribe().is_shutdown());
    }
}
