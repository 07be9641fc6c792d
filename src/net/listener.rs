//! TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address on a loop of the group
//! - Accept incoming TCP connections
//! - Enforce max_connections via a semaphore permit held for each session's lifetime
//! - Hand each accepted socket to the loop the group picks for it
//!
//! # Data Flow
//! ```text
//! accept (listener loop) → into_std → target loop: from_std → establish → accept_loop()
//! ```

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::error::{Result, TransportError};
use crate::net::connection::SessionId;
use crate::net::control::{Control, DisposeHook, SessionHandle, SessionShared};
use crate::net::options::SessionOptions;
use crate::net::session::{establish, TransportSession};
use crate::observability::metrics;
use crate::runtime::{EventLoopGroup, LoopHandle};

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A bound listening session.
#[derive(Debug)]
pub struct Listener {
    handle: SessionHandle,
    local_addr: SocketAddr,
    accepted: Option<mpsc::Receiver<TransportSession>>,
    max_connections: usize,
    limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind `addr` with default limits. Port 0 picks an ephemeral port.
    pub async fn bind(
        group: &EventLoopGroup,
        addr: SocketAddr,
        options: &SessionOptions,
    ) -> Result<Self> {
        Self::bind_with(group, addr, options, &ListenerConfig::default()).await
    }

    /// Bind the address and limits of a listener configuration.
    pub async fn from_config(
        group: &EventLoopGroup,
        config: &ListenerConfig,
        options: &SessionOptions,
    ) -> Result<Self> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            TransportError::Config(format!("invalid bind address '{}': {e}", config.bind_address))
        })?;
        Self::bind_with(group, addr, options, config).await
    }

    async fn bind_with(
        group: &EventLoopGroup,
        addr: SocketAddr,
        options: &SessionOptions,
        config: &ListenerConfig,
    ) -> Result<Self> {
        let handle = group.assign()?;
        let target = handle.clone();
        let acceptor_group = group.clone();
        let options = options.clone();
        let max_connections = config.max_connections.max(1);
        let backlog = config.backlog.max(1);

        handle
            .spawn(async move {
                let listener = TcpListener::bind(addr)
                    .await
                    .map_err(|e| TransportError::Bind {
                        addr: addr.to_string(),
                        source: Arc::new(e),
                    })?;
                let local_addr = listener.local_addr()?;

                let (shared, control_rx) = SessionShared::new(SessionId::new(), target.clone());
                let (sessions, accepted) = mpsc::channel(backlog);
                let limit = Arc::new(Semaphore::new(max_connections));

                let acceptor = Acceptor {
                    listener,
                    group: acceptor_group,
                    options,
                    limit: Arc::clone(&limit),
                    sessions,
                    shared: Arc::clone(&shared),
                    control_rx,
                };
                target.spawn(acceptor.run())?.detach();

                tracing::info!(
                    address = %local_addr,
                    loop_id = %target.id(),
                    max_connections,
                    "Listener bound"
                );

                Ok(Listener {
                    handle: SessionHandle::new(shared),
                    local_addr,
                    accepted: Some(accepted),
                    max_connections,
                    limit,
                })
            })?
            .await?
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port; the OS-assigned one when bound to port 0.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Accepted sessions, in accept order.
    ///
    /// The stream can be taken once; later calls fail with
    /// [`TransportError::StreamClosed`]. It ends when the listener is disposed.
    pub fn accept_loop(&mut self) -> Result<AcceptStream> {
        self.accepted
            .take()
            .map(|rx| AcceptStream { rx })
            .ok_or(TransportError::StreamClosed)
    }

    /// Current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop accepting and close the listening socket. Accepted sessions stay open.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub async fn dispose_now(&self) {
        self.handle.dispose_now().await;
    }

    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.on_dispose(hook);
    }
}

/// Lazy, non-restartable stream of accepted sessions.
#[derive(Debug)]
pub struct AcceptStream {
    rx: mpsc::Receiver<TransportSession>,
}

impl AcceptStream {
    pub async fn next_session(&mut self) -> Option<TransportSession> {
        self.rx.recv().await
    }
}

impl Stream for AcceptStream {
    type Item = TransportSession;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the pool, even if the
/// session's handler panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

struct Acceptor {
    listener: TcpListener,
    group: EventLoopGroup,
    options: SessionOptions,
    limit: Arc<Semaphore>,
    sessions: mpsc::Sender<TransportSession>,
    shared: Arc<SessionShared>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl Acceptor {
    async fn run(self) {
        let Acceptor {
            listener,
            group,
            options,
            limit,
            sessions,
            shared,
            mut control_rx,
        } = self;
        let mut hooks: Vec<DisposeHook> = Vec::new();
        let mut shutdown = shared.handle.shutdown_signal();

        let accepting = async {
            loop {
                // Acquire permit first (backpressure)
                let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                    return;
                };
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                };
                metrics::record_accepted();
                tracing::debug!(
                    peer_addr = %peer_addr,
                    available_permits = limit.available_permits(),
                    "Connection accepted"
                );

                let Ok(target) = group.assign() else {
                    return;
                };
                let permit = ConnectionPermit { _permit: permit };
                if hand_off(&target, stream, permit, &options, &sessions).is_err() {
                    return;
                }
            }
        };

        tokio::select! {
            _ = accepting => {}
            _ = SessionShared::wait_disposed(&mut control_rx, &mut hooks, &mut shutdown) => {}
        }

        drop(listener);
        drop(sessions);
        tracing::info!(listener_id = %shared.id, "Listener closed");
        shared.release(control_rx, hooks);
    }
}

/// Move an accepted socket to `target` and create its session there.
fn hand_off(
    target: &LoopHandle,
    stream: TcpStream,
    permit: ConnectionPermit,
    options: &SessionOptions,
    sessions: &mpsc::Sender<TransportSession>,
) -> Result<()> {
    let std_stream = match stream.into_std() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to detach accepted socket");
            return Ok(());
        }
    };
    let loop_handle = target.clone();
    let options = options.clone();
    let sessions = sessions.clone();

    target
        .spawn(async move {
            let stream = match TcpStream::from_std(std_stream) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to register accepted socket");
                    return;
                }
            };
            match establish(loop_handle, stream, &options, Some(permit)) {
                Ok(session) => {
                    if sessions.send(session).await.is_err() {
                        tracing::debug!("Accept stream dropped, closing session");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to establish accepted session"),
            }
        })?
        .detach();
    Ok(())
}
