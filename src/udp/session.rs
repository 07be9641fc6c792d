//! Unconnected UDP sessions.
//!
//! # Responsibilities
//! - Bind a socket on an assigned loop
//! - Receive datagrams into a bounded stream, reporting failures as items
//! - Send addressed datagrams, resolving once the syscall completed
//! - Release the socket exactly once, like a TCP session

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

use crate::config::schema::MAX_UDP_PAYLOAD;
use crate::config::NetConfig;
use crate::error::{Result, TransportError};
use crate::net::connection::{SessionGuard, SessionId, SessionState};
use crate::net::control::{Control, DisposeHook, SessionHandle, SessionShared};
use crate::observability::metrics;
use crate::runtime::{EventLoopGroup, LoopHandle, LoopId};
use crate::stream::wiretap::{LoggingWiretap, WireObserver};
use crate::udp::datagram::Datagram;

/// Sends queued ahead of the socket. Every send waits for its own completion.
const OUTBOUND_QUEUE: usize = 16;

#[cfg(any(target_os = "linux", target_os = "android"))]
const EMSGSIZE: i32 = 90;
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "openbsd"))]
const EMSGSIZE: i32 = 40;
#[cfg(windows)]
const EMSGSIZE: i32 = 10040;

/// Options of a datagram session.
#[derive(Debug, Clone)]
pub struct UdpOptions {
    /// Largest payload sent or received.
    pub max_datagram_size: usize,
    /// Datagrams buffered ahead of the consumer before the socket is left unread.
    pub inbound_credit: usize,
    /// Observer for every datagram payload.
    pub wiretap: Option<Arc<dyn WireObserver>>,
}

impl Default for UdpOptions {
    fn default() -> Self {
        Self {
            max_datagram_size: MAX_UDP_PAYLOAD,
            inbound_credit: 64,
            wiretap: None,
        }
    }
}

impl UdpOptions {
    pub fn from_config(config: &NetConfig) -> Self {
        let wiretap: Option<Arc<dyn WireObserver>> = config
            .observability
            .wiretap
            .then(|| Arc::new(LoggingWiretap) as Arc<dyn WireObserver>);
        Self {
            max_datagram_size: config.udp.max_datagram_size,
            inbound_credit: config.udp.inbound_credit,
            wiretap,
        }
    }

    pub fn max_datagram_size(mut self, bytes: usize) -> Self {
        self.max_datagram_size = bytes;
        self
    }

    pub fn wiretap(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.wiretap = Some(observer);
        self
    }
}

/// A bound UDP socket pinned to a loop.
#[derive(Debug)]
pub struct DatagramSession {
    handle: SessionHandle,
    local_addr: SocketAddr,
    stream: DatagramStream,
    sender: DatagramSender,
}

impl DatagramSession {
    /// Bind `addr` on a loop chosen by `group`. Port 0 picks an ephemeral port.
    pub async fn bind(
        group: &EventLoopGroup,
        addr: SocketAddr,
        options: &UdpOptions,
    ) -> Result<Self> {
        let handle = group.assign()?;
        let target = handle.clone();
        let options = options.clone();

        handle
            .spawn(async move {
                let socket = UdpSocket::bind(addr).await.map_err(|e| TransportError::Bind {
                    addr: addr.to_string(),
                    source: Arc::new(e),
                })?;
                open(target, socket, &options)
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

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Datagrams received by the socket, until the session is released.
    pub fn receive(&mut self) -> &mut DatagramStream {
        &mut self.stream
    }

    /// A cloneable sending handle.
    pub fn sender(&self) -> DatagramSender {
        self.sender.clone()
    }

    /// Send `datagram` to its recipient.
    pub async fn send(&self, datagram: Datagram) -> Result<()> {
        self.sender.send(datagram).await
    }

    pub fn split(self) -> (DatagramStream, DatagramSender, SessionHandle) {
        (self.stream, self.sender, self.handle)
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

/// Received datagrams, in arrival order.
///
/// A receive failure is an `Err` item; the stream keeps going afterwards.
/// It ends only when the session is released.
#[derive(Debug)]
pub struct DatagramStream {
    rx: mpsc::Receiver<Result<Datagram>>,
}

impl DatagramStream {
    /// Next datagram or receive error, `None` once the session is released.
    pub async fn next_datagram(&mut self) -> Option<Result<Datagram>> {
        self.rx.recv().await
    }
}

impl Stream for DatagramStream {
    type Item = Result<Datagram>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct OutgoingDatagram {
    datagram: Datagram,
    ack: oneshot::Sender<Result<()>>,
}

/// Sending half of a datagram session.
#[derive(Debug, Clone)]
pub struct DatagramSender {
    tx: mpsc::Sender<OutgoingDatagram>,
    shared: Arc<SessionShared>,
    max_size: usize,
}

impl DatagramSender {
    /// Send `datagram`; resolves once the send syscall completed.
    ///
    /// Payloads above the configured limit fail with
    /// [`TransportError::MessageTooLarge`] without touching the socket.
    pub async fn send(&self, datagram: Datagram) -> Result<()> {
        self.shared.check_writable()?;
        if datagram.len() > self.max_size {
            return Err(TransportError::MessageTooLarge {
                size: datagram.len(),
                limit: self.max_size,
            });
        }
        let (ack, done) = oneshot::channel();
        self.tx
            .send(OutgoingDatagram { datagram, ack })
            .await
            .map_err(|_| self.shared.closed_error())?;
        done.await.unwrap_or(Err(TransportError::Cancelled))
    }

    pub fn max_datagram_size(&self) -> usize {
        self.max_size
    }
}

impl std::fmt::Debug for OutgoingDatagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingDatagram")
            .field("recipient", &self.datagram.recipient())
            .field("len", &self.datagram.len())
            .finish()
    }
}

/// Wrap a bound socket into a session and start its driver. Runs on `handle`'s loop.
fn open(handle: LoopHandle, socket: UdpSocket, options: &UdpOptions) -> Result<DatagramSession> {
    let local_addr = socket.local_addr()?;
    let id = SessionId::new();
    let (shared, control_rx) = SessionShared::new(id, handle.clone());
    let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_credit.max(1));
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let max_size = options.max_datagram_size.clamp(1, MAX_UDP_PAYLOAD);

    let driver = DatagramDriver {
        shared: Arc::clone(&shared),
        socket,
        local_addr,
        inbound_tx,
        outbound_rx,
        control_rx,
        max_size,
        wiretap: options.wiretap.clone(),
        guard: handle.tracker().track(id),
    };
    handle.spawn(driver.run())?.detach();
    metrics::record_session_opened("udp");
    tracing::debug!(session_id = %id, loop_id = %handle.id(), local_addr = %local_addr, "Datagram session bound");

    Ok(DatagramSession {
        handle: SessionHandle::new(Arc::clone(&shared)),
        local_addr,
        stream: DatagramStream { rx: inbound_rx },
        sender: DatagramSender {
            tx: outbound_tx,
            shared,
            max_size,
        },
    })
}

struct DatagramDriver {
    shared: Arc<SessionShared>,
    socket: UdpSocket,
    local_addr: SocketAddr,
    inbound_tx: mpsc::Sender<Result<Datagram>>,
    outbound_rx: mpsc::Receiver<OutgoingDatagram>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    max_size: usize,
    wiretap: Option<Arc<dyn WireObserver>>,
    guard: SessionGuard,
}

impl DatagramDriver {
    async fn run(self) {
        let DatagramDriver {
            shared,
            socket,
            local_addr,
            inbound_tx,
            mut outbound_rx,
            mut control_rx,
            max_size,
            wiretap,
            guard,
        } = self;

        let mut hooks: Vec<DisposeHook> = Vec::new();
        let mut shutdown = shared.handle.shutdown_signal();
        let endpoint = Endpoint {
            shared: &shared,
            socket: &socket,
            local_addr,
            max_size,
            wiretap: wiretap.as_deref(),
        };

        tokio::select! {
            _ = endpoint.pump(inbound_tx, &mut outbound_rx) => {
                tracing::debug!(session_id = %shared.id, "Datagram stream and senders dropped");
            }
            _ = SessionShared::wait_disposed(&mut control_rx, &mut hooks, &mut shutdown) => {
                tracing::debug!(session_id = %shared.id, "Datagram session disposed");
            }
        }

        drop(socket);
        outbound_rx.close();
        while let Ok(pending) = outbound_rx.try_recv() {
            let _ = pending.ack.send(Err(TransportError::Cancelled));
        }
        shared.release(control_rx, hooks);
        metrics::record_session_closed("udp");
        drop(guard);
    }
}

struct Endpoint<'a> {
    shared: &'a SessionShared,
    socket: &'a UdpSocket,
    local_addr: SocketAddr,
    max_size: usize,
    wiretap: Option<&'a dyn WireObserver>,
}

impl Endpoint<'_> {
    /// Serve both directions until the stream and every sender are dropped.
    async fn pump(
        &self,
        inbound_tx: mpsc::Sender<Result<Datagram>>,
        outbound_rx: &mut mpsc::Receiver<OutgoingDatagram>,
    ) {
        // One spare byte tells an oversized datagram apart from one at the limit.
        let mut buf = vec![0u8; self.max_size + 1];
        let mut receiving = true;
        let mut sending = true;

        while receiving || sending {
            tokio::select! {
                received = self.receive(&inbound_tx, &mut buf), if receiving => {
                    if !received {
                        receiving = false;
                    }
                }
                outgoing = outbound_rx.recv(), if sending => match outgoing {
                    Some(OutgoingDatagram { datagram, ack }) => {
                        let _ = ack.send(self.send(&datagram).await);
                    }
                    None => sending = false,
                },
            }
        }
    }

    /// Receive one datagram into the stream. `false` once the stream is gone.
    async fn receive(&self, tx: &mpsc::Sender<Result<Datagram>>, buf: &mut [u8]) -> bool {
        // No credit, no receive: the kernel buffer absorbs the backlog.
        let Ok(permit) = tx.reserve().await else {
            return false;
        };
        let received = tokio::select! {
            received = self.socket.recv_from(buf) => received,
            _ = tx.closed() => return false,
        };
        let item = match received {
            Ok((n, _)) if n > self.max_size => Err(TransportError::MessageTooLarge {
                size: n,
                limit: self.max_size,
            }),
            Ok((n, sender)) => {
                let payload = Bytes::copy_from_slice(&buf[..n]);
                if let Some(observer) = self.wiretap {
                    observer.on_read(self.shared.id, &payload);
                }
                metrics::record_datagram("received");
                Ok(Datagram::received(payload, sender, self.local_addr))
            }
            Err(e) => {
                tracing::debug!(session_id = %self.shared.id, error = %e, "Datagram receive failed");
                Err(TransportError::from(e))
            }
        };
        permit.send(item);
        true
    }

    async fn send(&self, datagram: &Datagram) -> Result<()> {
        match self.socket.send_to(datagram.payload(), datagram.recipient()).await {
            Ok(_) => {
                if let Some(observer) = self.wiretap {
                    observer.on_write(self.shared.id, datagram.payload());
                }
                metrics::record_datagram("sent");
                Ok(())
            }
            Err(e) if is_message_too_large(&e) => Err(TransportError::MessageTooLarge {
                size: datagram.len(),
                limit: self.max_size,
            }),
            Err(e) => {
                tracing::debug!(
                    session_id = %self.shared.id,
                    recipient = %datagram.recipient(),
                    error = %e,
                    "Datagram send failed"
                );
                Err(TransportError::SendRejected {
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    windows
))]
fn is_message_too_large(e: &io::Error) -> bool {
    e.raw_os_error() == Some(EMSGSIZE)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    windows
)))]
fn is_message_too_large(_: &io::Error) -> bool {
    false
}
