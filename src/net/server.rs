//! Raw TCP servers.
//!
//! A [`TcpServer`] binds a [`Listener`] and runs a handler for every
//! accepted session, on that session's loop. When the handler returns, the
//! session's write direction is closed and the session disposed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ListenerConfig, NetConfig};
use crate::error::{Result, TransportError};
use crate::net::control::SessionHandle;
use crate::net::listener::{AcceptStream, Listener};
use crate::net::options::SessionOptions;
use crate::net::session::TransportSession;
use crate::runtime::EventLoopGroup;
use crate::stream::wiretap::WireObserver;
use crate::tls::TlsPolicy;

/// How long a finished handler's session may take to flush and half-close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server. Disposing it closes the listening socket.
#[derive(Debug, Clone)]
pub struct DisposableServer {
    handle: SessionHandle,
    local_addr: SocketAddr,
}

impl DisposableServer {
    pub(crate) fn new(listener: &Listener) -> Self {
        Self {
            handle: listener.handle(),
            local_addr: listener.local_addr(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

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

/// Builder for a TCP server.
#[derive(Debug, Clone)]
pub struct TcpServer {
    listener: ListenerConfig,
    options: SessionOptions,
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpServer {
    /// Server on `127.0.0.1:0` with default options.
    pub fn new() -> Self {
        Self {
            listener: ListenerConfig::default(),
            options: SessionOptions::default(),
        }
    }

    /// Listener, session and TLS settings from configuration.
    pub fn from_config(config: &NetConfig) -> Result<Self> {
        Ok(Self {
            listener: config.listener.clone(),
            options: SessionOptions::server_from_config(config)?,
        })
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.listener.bind_address = addr.to_string();
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.listener.max_connections = max;
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Secure every accepted session.
    pub fn secure(mut self, policy: TlsPolicy) -> Self {
        self.options.tls = Some(policy);
        self
    }

    pub fn wiretap(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.options.wiretap = Some(observer);
        self
    }

    /// Bind and run `handler` for every accepted session.
    pub async fn handle<F, Fut>(self, group: &EventLoopGroup, handler: F) -> Result<DisposableServer>
    where
        F: Fn(TransportSession) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut listener = Listener::from_config(group, &self.listener, &self.options).await?;
        let sessions = listener.accept_loop()?;
        let server = DisposableServer::new(&listener);
        serve(group, &listener, sessions, Arc::new(handler))?;
        Ok(server)
    }
}

/// Dispatch accepted sessions to `handler` on their own loops.
pub(crate) fn serve<F, Fut>(
    group: &EventLoopGroup,
    listener: &Listener,
    mut sessions: AcceptStream,
    handler: Arc<F>,
) -> Result<()>
where
    F: Fn(TransportSession) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let dispatch_loop = group
        .loop_handle(listener.handle().loop_id())
        .ok_or(TransportError::ShuttingDown)?;
    let group = group.clone();

    dispatch_loop
        .spawn(async move {
            while let Some(session) = sessions.next_session().await {
                let Some(session_loop) = group.loop_handle(session.loop_id()) else {
                    continue;
                };
                let handler = Arc::clone(&handler);
                let session_handle = session.handle();
                let outbound = session.outbound().clone();
                let spawned = session_loop.spawn(async move {
                    let id = session_handle.id();
                    if let Err(e) = handler(session).await {
                        tracing::warn!(session_id = %id, error = %e, "Session handler failed");
                    }
                    // TLS peers need close_notify before the socket is released.
                    match tokio::time::timeout(CLOSE_TIMEOUT, outbound.close()).await {
                        Ok(Err(e)) if !e.is_closed() => {
                            tracing::debug!(session_id = %id, error = %e, "Close after handler failed");
                        }
                        Err(_) => {
                            tracing::debug!(session_id = %id, "Close after handler timed out");
                        }
                        _ => {}
                    }
                    drop(outbound);
                    session_handle.dispose();
                });
                match spawned {
                    Ok(task) => task.detach(),
                    Err(_) => break,
                }
            }
        })?
        .detach();
    Ok(())
}
