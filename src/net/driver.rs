//! The task that owns a connected socket.
//!
//! # Data Flow
//! ```text
//! [TLS handshake] → split → read pump  ──▶ Inbound queue
//!                         → write pump ◀── Outbound queue (frame + ack)
//! control channel (Dispose / OnDispose) and group shutdown end both pumps
//! ```
//!
//! # Design Decisions
//! - The driver runs on the session's loop and is the only owner of the socket
//! - Release happens exactly once, at the end of `run`, whatever ended the session
//! - Both directions finishing (peer EOF and local half-close) releases the session

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::net::connection::SessionGuard;
use crate::net::control::{Control, DisposeHook, SessionShared};
use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;
use crate::stream::outbound::Outgoing;
use crate::tls::SecureTransport;

/// Byte pipe the driver can own: a TCP stream, possibly tapped or encrypted.
pub(crate) trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub(crate) type BoxedTransport = Box<dyn Transport>;

pub(crate) struct SessionDriver {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) io: BoxedTransport,
    pub(crate) tls: Option<SecureTransport>,
    pub(crate) inbound_tx: mpsc::Sender<Result<Bytes>>,
    pub(crate) outbound_rx: mpsc::Receiver<Outgoing>,
    pub(crate) control_rx: mpsc::UnboundedReceiver<Control>,
    pub(crate) read_buffer_size: usize,
    pub(crate) guard: SessionGuard,
    pub(crate) permit: Option<ConnectionPermit>,
}

impl SessionDriver {
    pub(crate) async fn run(self) {
        let SessionDriver {
            shared,
            io,
            tls,
            inbound_tx,
            mut outbound_rx,
            mut control_rx,
            read_buffer_size,
            guard,
            permit,
        } = self;

        let mut hooks: Vec<DisposeHook> = Vec::new();
        let mut shutdown = shared.handle.shutdown_signal();

        let io: BoxedTransport = match tls {
            None => io,
            Some(secure) => {
                let negotiated = tokio::select! {
                    result = secure.negotiate(io) => Some(result),
                    _ = SessionShared::wait_disposed(&mut control_rx, &mut hooks, &mut shutdown) => None,
                };
                match negotiated {
                    Some(Ok(stream)) => {
                        metrics::record_handshake("established");
                        tracing::debug!(session_id = %shared.id, "TLS established");
                        Box::new(stream)
                    }
                    Some(Err(err)) => {
                        metrics::record_handshake("failed");
                        tracing::warn!(session_id = %shared.id, error = %err, "TLS handshake failed");
                        shared.fail(err.clone());
                        let _ = inbound_tx.try_send(Err(err));
                        drop(inbound_tx);
                        finish(&shared, outbound_rx, control_rx, hooks, guard, permit);
                        return;
                    }
                    None => {
                        secure.abort("session disposed during handshake");
                        drop(inbound_tx);
                        finish(&shared, outbound_rx, control_rx, hooks, guard, permit);
                        return;
                    }
                }
            }
        };

        let (reader, writer) = tokio::io::split(io);
        let pumps = async {
            tokio::join!(
                read_pump(&shared, reader, inbound_tx, read_buffer_size),
                write_pump(&shared, writer, &mut outbound_rx),
            )
        };

        tokio::select! {
            _ = pumps => {
                tracing::debug!(session_id = %shared.id, "Both directions finished");
            }
            _ = SessionShared::wait_disposed(&mut control_rx, &mut hooks, &mut shutdown) => {
                tracing::debug!(session_id = %shared.id, "Session disposed");
            }
        }

        finish(&shared, outbound_rx, control_rx, hooks, guard, permit);
    }
}

/// Fail writes nobody will perform, then release.
fn finish(
    shared: &SessionShared,
    mut outbound_rx: mpsc::Receiver<Outgoing>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    hooks: Vec<DisposeHook>,
    guard: SessionGuard,
    permit: Option<ConnectionPermit>,
) {
    outbound_rx.close();
    let pending = shared.failure().unwrap_or(TransportError::Cancelled);
    while let Ok(outgoing) = outbound_rx.try_recv() {
        outgoing.fail(pending.clone());
    }
    shared.release(control_rx, hooks);
    metrics::record_session_closed("tcp");
    drop(permit);
    drop(guard);
}

async fn read_pump<R>(
    shared: &SessionShared,
    mut reader: R,
    tx: mpsc::Sender<Result<Bytes>>,
    buffer_size: usize,
) where
    R: AsyncRead + Unpin,
{
    loop {
        // No credit, no read: a full queue leaves data in the kernel buffer.
        let Ok(permit) = tx.reserve().await else {
            return;
        };
        let mut buf = BytesMut::with_capacity(buffer_size);
        let read = tokio::select! {
            read = reader.read_buf(&mut buf) => read,
            _ = tx.closed() => return,
        };
        match read {
            Ok(0) => {
                tracing::trace!(session_id = %shared.id, "Peer closed its write direction");
                return;
            }
            Ok(n) => {
                metrics::record_bytes("read", n);
                permit.send(Ok(buf.freeze()));
            }
            Err(e) => {
                let err = TransportError::from_stream(e);
                tracing::debug!(session_id = %shared.id, error = %err, "Read failed");
                shared.fail(err.clone());
                permit.send(Err(err));
                shared.dispose();
                return;
            }
        }
    }
}

async fn write_pump<W>(shared: &SessionShared, mut writer: W, rx: &mut mpsc::Receiver<Outgoing>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Frame { data, ack } => {
                let written = async {
                    writer.write_all(&data).await?;
                    writer.flush().await
                }
                .await;
                match written {
                    Ok(()) => {
                        metrics::record_bytes("write", data.len());
                        let _ = ack.send(Ok(()));
                    }
                    Err(e) => {
                        let err = TransportError::from_stream(e);
                        tracing::debug!(session_id = %shared.id, error = %err, "Write failed");
                        shared.fail(err.clone());
                        let _ = ack.send(Err(err));
                        shared.dispose();
                        return;
                    }
                }
            }
            Outgoing::Close { ack } => {
                let closed = writer.shutdown().await.map_err(TransportError::from_stream);
                tracing::trace!(session_id = %shared.id, "Write direction closed");
                let _ = ack.send(closed);
                return;
            }
        }
    }
    // Every Outbound handle is gone.
    let _ = writer.shutdown().await;
}
