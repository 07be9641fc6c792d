//! Session identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Track session state (Active → Draining → Closed)
//! - Count live sessions so shutdown can wait for them to release

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Relaxed ordering is enough: IDs only need to be unique.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a session (TCP or datagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open; traffic flows in both directions.
    Active,
    /// Disposal requested; resources are being released.
    Draining,
    /// Every resource is released and dispose hooks have run.
    Closed,
}

/// Counts sessions that still hold resources.
///
/// The count lives in a watch channel so waiters wake on every change
/// instead of polling.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new live session. The returned guard releases it on drop.
    pub fn track(&self, id: SessionId) -> SessionGuard {
        self.active.send_modify(|count| *count += 1);
        SessionGuard {
            active: Arc::clone(&self.active),
            id,
        }
    }

    /// Current number of live sessions.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until no session is live.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a session counted while alive.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<watch::Sender<u64>>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
        tracing::trace!(session_id = %self.id, "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn tracker_counts() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track(SessionId::new());
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track(SessionId::new());
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_wakes_on_last_release() {
        let tracker = SessionTracker::new();
        let guard = tracker.track(SessionId::new());

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
