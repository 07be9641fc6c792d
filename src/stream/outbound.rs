//! Sending half of a ByteStream.

use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TransportError};
use crate::net::control::SessionShared;
use crate::stream::file::{file_frames, DEFAULT_FILE_CHUNK};

pub(crate) type Ack = oneshot::Sender<Result<()>>;

/// Work for a session's write pump.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Frame { data: Bytes, ack: Ack },
    Close { ack: Ack },
}

impl Outgoing {
    pub(crate) fn fail(self, err: TransportError) {
        let ack = match self {
            Outgoing::Frame { ack, .. } | Outgoing::Close { ack } => ack,
        };
        let _ = ack.send(Err(err));
    }
}

/// Sink for frames written to a session.
///
/// Cheap to clone. The queue toward the socket is bounded, and every
/// send waits for its frame to be written, so a producer never runs
/// ahead of the transport.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Outgoing>,
    shared: Arc<SessionShared>,
}

impl Outbound {
    pub(crate) fn new(tx: mpsc::Sender<Outgoing>, shared: Arc<SessionShared>) -> Self {
        Self { tx, shared }
    }

    /// Write one frame; resolves once it was written and flushed.
    pub async fn send(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.shared.check_writable()?;
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outgoing::Frame {
                data: frame.into(),
                ack,
            })
            .await
            .map_err(|_| self.shared.closed_error())?;
        done.await.map_err(|_| TransportError::Cancelled)?
    }

    pub async fn send_string(&self, text: &str) -> Result<()> {
        self.send(Bytes::copy_from_slice(text.as_bytes())).await
    }

    /// Write every frame of `frames`, pulling the next one only after the
    /// previous was acknowledged.
    pub async fn send_stream<S>(&self, frames: S) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>>,
    {
        let mut frames = pin!(frames);
        while let Some(frame) = frames.next().await {
            self.send(frame?).await?;
        }
        Ok(())
    }

    /// Stream a file's contents.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<()> {
        self.send_stream(file_frames(path, DEFAULT_FILE_CHUNK)).await
    }

    /// Half-close: queued frames are written, then the write direction shuts down.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.shared.close_write() {
            return Ok(());
        }
        let (ack, done) = oneshot::channel();
        if self.tx.send(Outgoing::Close { ack }).await.is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }
}
