//! `AsyncRead`/`AsyncWrite` view of a session's ByteStream.
//!
//! Protocol engines that expect a byte pipe (the HTTP/1.1 server) run on
//! top of this adapter instead of the raw socket, so they inherit the
//! session's credit, TLS and disposal behavior.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::{Result, TransportError};
use crate::stream::inbound::Inbound;
use crate::stream::outbound::Outbound;

/// Byte pipe over a session. Dropping it disposes the session.
pub struct SessionIo {
    inbound: Inbound,
    outbound: Outbound,
    pending_read: Bytes,
    /// At most one frame is in flight toward the socket.
    in_flight: Option<BoxFuture<'static, Result<()>>>,
    closing: Option<BoxFuture<'static, Result<()>>>,
}

impl fmt::Debug for SessionIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIo")
            .field("pending_read", &self.pending_read.len())
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}

impl SessionIo {
    pub(crate) fn new(inbound: Inbound, outbound: Outbound) -> Self {
        Self {
            inbound,
            outbound,
            pending_read: Bytes::new(),
            in_flight: None,
            closing: None,
        }
    }

    fn poll_in_flight(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(send) = self.in_flight.as_mut() {
            let result = ready!(send.poll_unpin(cx));
            self.in_flight = None;
            result?;
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for SessionIo {
    fn drop(&mut self) {
        self.outbound.shared().dispose();
    }
}

impl AsyncRead for SessionIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while this.pending_read.is_empty() {
            match ready!(this.inbound.poll_frame(cx)) {
                Ok(Some(frame)) => this.pending_read = frame,
                Ok(None) | Err(TransportError::StreamClosed) => return Poll::Ready(Ok(())),
                Err(err) => return Poll::Ready(Err(err.into())),
            }
        }
        let n = this.pending_read.len().min(buf.remaining());
        buf.put_slice(&this.pending_read.split_to(n));
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SessionIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_in_flight(cx))?;
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let outbound = this.outbound.clone();
        let frame = Bytes::copy_from_slice(data);
        this.in_flight = Some(Box::pin(async move { outbound.send(frame).await }));
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().poll_in_flight(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_in_flight(cx))?;
        let outbound = this.outbound.clone();
        let closing = this
            .closing
            .get_or_insert_with(|| Box::pin(async move { outbound.close().await }));
        let result = ready!(closing.poll_unpin(cx));
        Poll::Ready(result.map_err(io::Error::from))
    }
}
