//! Connected TCP sessions.
//!
//! # Responsibilities
//! - Establish client sessions with a connect deadline
//! - Turn an accepted or connected socket into a session on its loop
//! - Expose the session's ByteStream, TLS state and disposal contract

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::net::connection::{SessionId, SessionState};
use crate::net::control::{SessionHandle, SessionShared};
use crate::net::driver::{BoxedTransport, SessionDriver};
use crate::net::listener::ConnectionPermit;
use crate::net::options::SessionOptions;
use crate::observability::metrics;
use crate::runtime::{EventLoopGroup, LoopHandle, LoopId};
use crate::stream::inbound::Inbound;
use crate::stream::io::SessionIo;
use crate::stream::outbound::Outbound;
use crate::stream::wiretap::Tapped;
use crate::tls::{HandshakeState, SecureTransport};

/// One established TCP connection, pinned to a loop.
///
/// Reading goes through [`inbound`](Self::inbound), writing through
/// [`outbound`](Self::outbound). Dropping every handle of both directions
/// releases the session; [`dispose`](Self::dispose) releases it at once.
#[derive(Debug)]
pub struct TransportSession {
    handle: SessionHandle,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    inbound: Inbound,
    outbound: Outbound,
    tls: Option<SecureTransport>,
}

impl TransportSession {
    /// Connect to `addr` on a loop chosen by `group`.
    ///
    /// Fails with [`TransportError::ConnectTimeout`] when the TCP handshake
    /// does not complete within `options.connect_timeout`. A TLS handshake,
    /// when configured, continues in the background; see [`Self::handshake`].
    pub async fn connect(
        group: &EventLoopGroup,
        addr: SocketAddr,
        options: &SessionOptions,
    ) -> Result<Self> {
        let handle = group.assign()?;
        let target = handle.clone();
        let options = options.clone();

        handle
            .spawn(async move {
                let timeout = options.connect_timeout;
                let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => return Err(TransportError::from_connect(addr, e)),
                    Err(_) => return Err(TransportError::ConnectTimeout { addr, timeout }),
                };
                tracing::debug!(peer_addr = %addr, loop_id = %target.id(), "Connected");
                establish(target, stream, &options, None)
            })?
            .await?
    }

    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    pub fn loop_id(&self) -> LoopId {
        self.handle.loop_id()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Lifecycle handle that outlives the session's streams.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Incoming frames.
    pub fn inbound(&mut self) -> &mut Inbound {
        &mut self.inbound
    }

    /// Sink for outgoing frames.
    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// TLS layer of a secured session.
    pub fn secure_transport(&self) -> Option<&SecureTransport> {
        self.tls.as_ref()
    }

    pub fn handshake_state(&self) -> Option<HandshakeState> {
        self.tls.as_ref().map(SecureTransport::state)
    }

    /// Wait for the TLS handshake; immediate for plain sessions.
    pub async fn handshake(&self) -> Result<()> {
        match &self.tls {
            Some(secure) => secure.established().await,
            None => Ok(()),
        }
    }

    /// Take the session apart into its two directions and a lifecycle handle.
    pub fn split(self) -> (Inbound, Outbound, SessionHandle) {
        (self.inbound, self.outbound, self.handle)
    }

    /// Byte-pipe view of the session, for protocol engines.
    pub fn into_io(self) -> SessionIo {
        SessionIo::new(self.inbound, self.outbound)
    }

    /// Half-close the write direction, then dispose.
    pub async fn close(&self) -> Result<()> {
        let closed = self.outbound.close().await;
        self.dispose();
        match closed {
            Err(err) if !err.is_closed() => Err(err),
            _ => Ok(()),
        }
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

/// Wrap `stream` into a session and start its driver.
///
/// Must run on `handle`'s loop: the socket is registered with the calling
/// thread's reactor.
pub(crate) fn establish(
    handle: LoopHandle,
    stream: TcpStream,
    options: &SessionOptions,
    permit: Option<ConnectionPermit>,
) -> Result<TransportSession> {
    let local_addr = stream.local_addr()?;
    let peer_addr = stream.peer_addr()?;
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let id = SessionId::new();
    let (shared, control_rx) = SessionShared::new(id, handle.clone());
    let (inbound_tx, inbound_rx) = mpsc::channel(options.stream.inbound_credit.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(options.stream.outbound_credit.max(1));

    let io: BoxedTransport = match &options.wiretap {
        Some(observer) => Box::new(Tapped::new(stream, id, Arc::clone(observer))),
        None => Box::new(stream),
    };
    let tls = options
        .tls
        .clone()
        .map(|policy| SecureTransport::secure(policy, options.handshake_timeout));

    let driver = SessionDriver {
        shared: Arc::clone(&shared),
        io,
        tls: tls.clone(),
        inbound_tx,
        outbound_rx,
        control_rx,
        read_buffer_size: options.stream.read_buffer_size.max(1),
        guard: handle.tracker().track(id),
        permit,
    };
    handle.spawn(driver.run())?.detach();
    metrics::record_session_opened("tcp");

    tracing::debug!(
        session_id = %id,
        loop_id = %handle.id(),
        local_addr = %local_addr,
        peer_addr = %peer_addr,
        secure = tls.is_some(),
        "Session established"
    );

    Ok(TransportSession {
        handle: SessionHandle::new(Arc::clone(&shared)),
        local_addr,
        peer_addr,
        inbound: Inbound::new(inbound_rx),
        outbound: Outbound::new(outbound_tx, shared),
        tls,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpSocket;

    use super::*;

    #[tokio::test]
    async fn connect_times_out_when_accept_queue_is_full() {
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let addr = listener.local_addr().unwrap();

        // Nothing accepts, so once the queue fills further SYNs go unanswered.
        let mut parked = Vec::new();
        for _ in 0..64 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => parked.push(stream),
                Ok(Err(e)) => panic!("filler connect failed: {e}"),
                Err(_) => break,
            }
        }

        let group = EventLoopGroup::create("connect-timeout", 1).unwrap();
        let options = SessionOptions::default().connect_timeout(Duration::from_millis(200));
        let err = TransportSession::connect(&group, addr, &options).await.unwrap_err();
        assert!(
            matches!(err, TransportError::ConnectTimeout { addr: a, timeout } if a == addr && timeout == Duration::from_millis(200)),
            "{err:?}"
        );

        drop(parked);
        group.shutdown().await;
    }
}
