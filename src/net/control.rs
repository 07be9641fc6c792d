//! Disposal contract shared by every session kind.
//!
//! # Responsibilities
//! - Idempotent `dispose`, delivered to the owning driver as a message
//! - Dispose hooks that run exactly once, on the loop, at release
//! - Record the first failure so later operations report it
//!
//! A driver owns the receiving side of the control channel. Once it
//! releases, the channel is closed and late hooks run inline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, watch};

use crate::error::{Result, TransportError};
use crate::net::connection::{SessionId, SessionState};
use crate::runtime::{LoopHandle, LoopId, ShutdownSignal};

pub(crate) type DisposeHook = Box<dyn FnOnce() + Send>;

pub(crate) enum Control {
    Dispose,
    OnDispose(DisposeHook),
}

/// State visible to both the driver and the user-facing handles.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) handle: LoopHandle,
    state: watch::Sender<SessionState>,
    disposed: AtomicBool,
    write_closed: AtomicBool,
    failure: OnceLock<TransportError>,
    control: mpsc::UnboundedSender<Control>,
}

impl SessionShared {
    pub(crate) fn new(
        id: SessionId,
        handle: LoopHandle,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Control>) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Active);
        let shared = Arc::new(Self {
            id,
            handle,
            state,
            disposed: AtomicBool::new(false),
            write_closed: AtomicBool::new(false),
            failure: OnceLock::new(),
            control,
        });
        (shared, control_rx)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_if_modified(|state| {
            let active = *state == SessionState::Active;
            if active {
                *state = SessionState::Draining;
            }
            active
        });
        let _ = self.control.send(Control::Dispose);
    }

    pub(crate) async fn dispose_now(&self) {
        self.dispose();
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() == SessionState::Closed {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) fn on_dispose(&self, hook: DisposeHook) {
        if let Err(mpsc::error::SendError(Control::OnDispose(hook))) =
            self.control.send(Control::OnDispose(hook))
        {
            hook();
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Mark the write direction closed. Returns `true` if it already was.
    pub(crate) fn close_write(&self) -> bool {
        self.write_closed.swap(true, Ordering::SeqCst)
    }

    /// Record the session's first failure.
    pub(crate) fn fail(&self, err: TransportError) {
        let _ = self.failure.set(err);
    }

    pub(crate) fn failure(&self) -> Option<TransportError> {
        self.failure.get().cloned()
    }

    /// Error for an operation on a stream that is no longer open.
    pub(crate) fn closed_error(&self) -> TransportError {
        self.failure().unwrap_or(TransportError::StreamClosed)
    }

    /// Check that a new write may be queued.
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.handle.is_shutting_down() {
            return Err(TransportError::ShuttingDown);
        }
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if self.write_closed.load(Ordering::SeqCst) || self.is_disposed() {
            return Err(TransportError::StreamClosed);
        }
        Ok(())
    }

    /// Wait for a dispose request or group shutdown, collecting hooks meanwhile.
    pub(crate) async fn wait_disposed(
        control: &mut mpsc::UnboundedReceiver<Control>,
        hooks: &mut Vec<DisposeHook>,
        shutdown: &mut ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                msg = control.recv() => match msg {
                    Some(Control::OnDispose(hook)) => hooks.push(hook),
                    Some(Control::Dispose) | None => return,
                },
                _ = shutdown.recv() => return,
            }
        }
    }

    /// Final step of every driver: close the control channel, run hooks, mark closed.
    pub(crate) fn release(
        &self,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut hooks: Vec<DisposeHook>,
    ) {
        self.disposed.store(true, Ordering::SeqCst);
        self.write_closed.store(true, Ordering::SeqCst);
        control.close();
        while let Ok(msg) = control.try_recv() {
            if let Control::OnDispose(hook) = msg {
                hooks.push(hook);
            }
        }
        for hook in hooks {
            hook();
        }
        self.state.send_replace(SessionState::Closed);
        tracing::debug!(session_id = %self.id, loop_id = %self.handle.id(), "Session released");
    }
}

/// Cloneable handle to a session's lifecycle.
///
/// Lets another task dispose a session, or observe it, without owning its streams.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Loop the session is pinned to.
    pub fn loop_id(&self) -> LoopId {
        self.shared.handle.id()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Request release of the session. Idempotent; returns immediately.
    pub fn dispose(&self) {
        self.shared.dispose();
    }

    /// Dispose and wait until every resource is released.
    pub async fn dispose_now(&self) {
        self.shared.dispose_now().await;
    }

    /// Run `hook` once when the session is released, or now if it already was.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.on_dispose(Box::new(hook));
    }
}
