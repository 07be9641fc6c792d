//! Helpers over any stream of frames.

use std::io;
use std::pin::pin;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use futures_util::FutureExt;

use crate::error::{Result, TransportError};

/// Boxed frame stream, the common currency of request bodies and file transfers.
pub type FrameStream = BoxStream<'static, Result<Bytes>>;

/// Aggregation and decoding over frame streams.
pub trait FrameStreamExt: Stream<Item = Result<Bytes>> + Send + Sized + 'static {
    /// Collect every frame into one buffer.
    fn aggregate(self) -> BoxFuture<'static, Result<Bytes>> {
        async move {
            let mut frames = pin!(self);
            let mut buf = BytesMut::new();
            while let Some(frame) = frames.next().await {
                buf.extend_from_slice(&frame?);
            }
            Ok(buf.freeze())
        }
        .boxed()
    }

    /// Collect every frame and decode the result as UTF-8.
    fn aggregate_string(self) -> BoxFuture<'static, Result<String>> {
        self.aggregate()
            .map(|bytes| {
                String::from_utf8(bytes?.to_vec()).map_err(|e| {
                    TransportError::from(io::Error::new(io::ErrorKind::InvalidData, e))
                })
            })
            .boxed()
    }

    /// Decode each frame on its own, replacing invalid UTF-8.
    fn strings(self) -> BoxStream<'static, Result<String>> {
        self.map(|frame| frame.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
            .boxed()
    }
}

impl<S> FrameStreamExt for S where S: Stream<Item = Result<Bytes>> + Send + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn frames(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn aggregate_joins_frames() {
        assert_eq!(
            frames(&["Hel", "lo"]).aggregate_string().await.unwrap(),
            "Hello"
        );
    }

    #[tokio::test]
    async fn aggregate_stops_at_first_error() {
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"x")),
            Err(TransportError::ConnectionReset),
        ]);
        assert!(matches!(
            failing.aggregate().await,
            Err(TransportError::ConnectionReset)
        ));
    }

    #[tokio::test]
    async fn strings_are_per_frame() {
        let decoded: Vec<String> = frames(&["a", "b"])
            .strings()
            .map(|s| s.unwrap())
            .collect()
            .await;
        assert_eq!(decoded, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_reported() {
        let bad = stream::iter(vec![Ok::<_, TransportError>(Bytes::from_static(&[0xff, 0xfe]))]);
        assert!(bad.aggregate_string().await.is_err());
    }
}
