//! Transport error taxonomy.
//!
//! Every asynchronous operation of the core (connect, send, receive,
//! handshake, datagram send) resolves with [`TransportError`] on failure.
//! The type is `Clone` so a single session failure can be reported to every
//! pending signal of that session.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// Errors surfaced by sessions, streams, the router and the loop group.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No TCP handshake completed within the connect deadline.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: SocketAddr, timeout: Duration },

    /// The peer actively refused the connection.
    #[error("connection to {addr} refused")]
    ConnectRefused { addr: SocketAddr },

    /// No route to the peer host or network.
    #[error("host unreachable: {addr}")]
    HostUnreachable { addr: SocketAddr },

    /// Read past end-of-stream, or write on a closed sink.
    #[error("stream closed")]
    StreamClosed,

    /// The transport was reset or aborted by the peer.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// TLS negotiation failed (certificate rejected, protocol mismatch, abort, timeout).
    #[error("TLS handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    /// No HTTP route matches the request.
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    /// Datagram payload larger than the transport accepts.
    #[error("datagram of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    /// The datagram send syscall failed.
    #[error("datagram send rejected: {reason}")]
    SendRejected { reason: String },

    /// The event loop group stopped accepting work.
    #[error("event loop group is shutting down")]
    ShuttingDown,

    /// The operation was abandoned because its session was disposed.
    #[error("operation cancelled")]
    Cancelled,

    /// Binding a listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Invalid options handed to the core.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// TLS material could not be loaded or assembled.
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl TransportError {
    /// Map an error returned by a TCP connect attempt.
    pub fn from_connect(addr: SocketAddr, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::ConnectRefused { addr },
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                TransportError::HostUnreachable { addr }
            }
            _ => TransportError::Io(Arc::new(err)),
        }
    }

    /// Map an error raised while reading or writing an established stream.
    pub fn from_stream(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => TransportError::ConnectionReset,
            _ => TransportError::Io(Arc::new(err)),
        }
    }

    pub(crate) fn handshake(reason: impl std::fmt::Display) -> Self {
        TransportError::HandshakeFailed {
            reason: reason.to_string(),
        }
    }

    /// True for outcomes that only mean "this stream is over".
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TransportError::StreamClosed | TransportError::Cancelled | TransportError::ShuttingDown
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::ConnectTimeout { .. } => io::ErrorKind::TimedOut,
            TransportError::ConnectRefused { .. } => io::ErrorKind::ConnectionRefused,
            TransportError::HostUnreachable { .. } => io::ErrorKind::HostUnreachable,
            TransportError::StreamClosed => io::ErrorKind::BrokenPipe,
            TransportError::ConnectionReset => io::ErrorKind::ConnectionReset,
            TransportError::Cancelled | TransportError::ShuttingDown => {
                io::ErrorKind::ConnectionAborted
            }
            TransportError::HandshakeFailed { .. } => io::ErrorKind::InvalidData,
            TransportError::Io(inner) => inner.kind(),
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_errors_are_classified() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(
            TransportError::from_connect(addr, refused),
            TransportError::ConnectRefused { .. }
        ));

        let unreachable = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert!(matches!(
            TransportError::from_connect(addr, unreachable),
            TransportError::HostUnreachable { .. }
        ));
    }

    #[test]
    fn reset_is_distinct_from_closed() {
        let reset = TransportError::from_stream(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(reset, TransportError::ConnectionReset));
        assert!(!reset.is_closed());
        assert!(TransportError::StreamClosed.is_closed());
    }

    #[test]
    fn io_conversion_keeps_kind() {
        let err: io::Error = TransportError::ConnectionReset.into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let err: io::Error = TransportError::StreamClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
