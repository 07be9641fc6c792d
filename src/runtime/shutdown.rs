//! Shutdown coordination for an event loop group.

use tokio::sync::watch;

/// Coordinator for group shutdown.
///
/// Backed by a watch channel, so a task that subscribes after the signal
/// fired still observes it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Returns `false` if it had already fired.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
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

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered.
    pub async fn recv(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn late_subscribers_see_the_signal() {
        let shutdown = Shutdown::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());

        let mut signal = shutdown.subscribe();
        tokio::time::timeout(Duration::from_millis(100), signal.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pending_until_triggered() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        assert!(tokio::time::timeout(Duration::from_millis(20), signal.recv())
            .await
            .is_err());

        shutdown.trigger();
        signal.recv().await;
        assert!(shutdown.is_triggered());
    }
}
