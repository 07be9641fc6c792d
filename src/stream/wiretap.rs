//! Wire logging.
//!
//! A [`WireObserver`] sees copies of the bytes crossing a session's socket.
//! It sits below TLS, so a secured session only exposes ciphertext.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::connection::SessionId;

/// Receives read-only copies of wire traffic.
pub trait WireObserver: Send + Sync + fmt::Debug {
    fn on_read(&self, session: SessionId, data: &[u8]);
    fn on_write(&self, session: SessionId, data: &[u8]);
}

/// Observer that writes traffic through `tracing` at debug level.
#[derive(Debug, Clone, Default)]
pub struct LoggingWiretap;

impl WireObserver for LoggingWiretap {
    fn on_read(&self, session: SessionId, data: &[u8]) {
        tracing::debug!(
            target: "netloop::wiretap",
            session_id = %session,
            direction = "read",
            len = data.len(),
            data = %data.escape_ascii(),
            "wire"
        );
    }

    fn on_write(&self, session: SessionId, data: &[u8]) {
        tracing::debug!(
            target: "netloop::wiretap",
            session_id = %session,
            direction = "write",
            len = data.len(),
            data = %data.escape_ascii(),
            "wire"
        );
    }
}

/// Socket wrapper reporting traffic to an observer.
pub(crate) struct Tapped<T> {
    inner: T,
    session: SessionId,
    observer: Arc<dyn WireObserver>,
}

impl<T> Tapped<T> {
    pub(crate) fn new(inner: T, session: SessionId, observer: Arc<dyn WireObserver>) -> Self {
        Self {
            inner,
            session,
            observer,
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for Tapped<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = &buf.filled()[before..];
        if !read.is_empty() {
            this.observer.on_read(this.session, read);
        }
        Poll::Ready(Ok(()))
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for Tapped<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, data))?;
        if written > 0 {
            this.observer.on_write(this.session, &data[..written]);
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[derive(Debug, Default)]
    struct Recorder {
        read: Mutex<Vec<u8>>,
        written: Mutex<Vec<u8>>,
    }

    impl WireObserver for Recorder {
        fn on_read(&self, _: SessionId, data: &[u8]) {
            self.read.lock().unwrap().extend_from_slice(data);
        }
        fn on_write(&self, _: SessionId, data: &[u8]) {
            self.written.lock().unwrap().extend_from_slice(data);
        }
    }

    #[tokio::test]
    async fn observer_sees_both_directions() {
        let recorder = Arc::new(Recorder::default());
        let (a, mut b) = tokio::io::duplex(64);
        let mut tapped = Tapped::new(a, SessionId::new(), recorder.clone());

        tapped.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).await.unwrap();
        b.write_all(b"pong").await.unwrap();
        tapped.read_exact(&mut buf).await.unwrap();

        assert_eq!(&*recorder.written.lock().unwrap(), b"ping");
        assert_eq!(&*recorder.read.lock().unwrap(), b"pong");
    }
}
