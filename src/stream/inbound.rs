//! Receiving half of a ByteStream.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

/// Frames read from a session, in arrival order.
///
/// Backed by a bounded queue: while it is full the session stops reading
/// its socket. The sequence ends once (peer end-of-stream, a transport
/// failure, or disposal) and cannot be restarted.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<Result<Bytes>>,
    ended: bool,
}

impl Inbound {
    pub(crate) fn new(rx: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self { rx, ended: false }
    }

    /// Next frame, `Ok(None)` at end-of-stream.
    ///
    /// Reading again after the end was reported fails with
    /// [`TransportError::StreamClosed`].
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        std::future::poll_fn(|cx| self.poll_frame(cx)).await
    }

    pub fn poll_frame(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<Bytes>>> {
        if self.ended {
            return Poll::Ready(Err(TransportError::StreamClosed));
        }
        match ready!(self.rx.poll_recv(cx)) {
            Some(Ok(frame)) => Poll::Ready(Ok(Some(frame))),
            Some(Err(err)) => {
                self.ended = true;
                self.rx.close();
                Poll::Ready(Err(err))
            }
            None => {
                self.ended = true;
                Poll::Ready(Ok(None))
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl Stream for Inbound {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.ended {
            return Poll::Ready(None);
        }
        this.poll_frame(cx).map(Result::transpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn end_is_reported_once() {
        let (tx, rx) = mpsc::channel(4);
        let mut inbound = Inbound::new(rx);
        tx.send(Ok(Bytes::from_static(b"a"))).await.unwrap();
        drop(tx);

        assert_eq!(inbound.next_frame().await.unwrap().unwrap(), "a");
        assert!(inbound.next_frame().await.unwrap().is_none());
        assert!(matches!(
            inbound.next_frame().await,
            Err(TransportError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn errors_end_the_stream() {
        let (tx, rx) = mpsc::channel(4);
        let mut inbound = Inbound::new(rx);
        tx.send(Err(TransportError::ConnectionReset)).await.unwrap();

        assert!(matches!(
            inbound.next().await,
            Some(Err(TransportError::ConnectionReset))
        ));
        assert!(inbound.next().await.is_none());
        assert!(tx.is_closed());
    }
}
