//! Completion handle for work queued on a loop.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::TransportError;

/// Resolves with the output of a task spawned through [`LoopHandle::spawn`].
///
/// Dropping the handle detaches the task; it keeps running on its loop.
/// Resolves with [`TransportError::Cancelled`] when the task was dropped
/// before finishing (for instance when shutdown aborted it).
///
/// [`LoopHandle::spawn`]: crate::runtime::LoopHandle::spawn
#[derive(Debug)]
#[must_use = "dropping a LoopTask detaches it"]
pub struct LoopTask<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> LoopTask<T> {
    pub(crate) fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Run the task without waiting for it.
    pub fn detach(self) {}
}

impl<T> Future for LoopTask<T> {
    type Output = Result<T, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| TransportError::Cancelled))
    }
}
