//! TLS negotiation around a session's raw transport.
//!
//! # Data Flow
//! ```text
//! socket → (wiretap) → SecureTransport::negotiate → TlsStream → session pumps
//! ```
//!
//! The session driver runs the handshake on the session's loop before any
//! application frame moves. Writes queued meanwhile stay in the outbound
//! channel, so nothing leaves in clear text.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::error::{Result, TransportError};
use crate::tls::policy::TlsPolicy;

/// Progress of a session's handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    Handshaking,
    Established,
    Failed,
}

/// TLS layer attached to one session.
///
/// Clones observe the same handshake.
#[derive(Debug, Clone)]
pub struct SecureTransport {
    policy: TlsPolicy,
    handshake_timeout: Duration,
    state: Arc<watch::Sender<HandshakeState>>,
    failure: Arc<OnceLock<TransportError>>,
}

impl SecureTransport {
    /// Compose `policy` around a session; the handshake must finish within `handshake_timeout`.
    pub fn secure(policy: TlsPolicy, handshake_timeout: Duration) -> Self {
        let (state, _) = watch::channel(HandshakeState::NotStarted);
        Self {
            policy,
            handshake_timeout,
            state: Arc::new(state),
            failure: Arc::new(OnceLock::new()),
        }
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<HandshakeState> {
        self.state.subscribe()
    }

    pub fn policy(&self) -> &TlsPolicy {
        &self.policy
    }

    /// Wait for the handshake outcome.
    pub async fn established(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                HandshakeState::Established => return Ok(()),
                HandshakeState::Failed => return Err(self.failure()),
                HandshakeState::NotStarted | HandshakeState::Handshaking => {}
            }
            if rx.changed().await.is_err() {
                return Err(self.failure());
            }
        }
    }

    /// Run the handshake over `io`.
    pub(crate) async fn negotiate<IO>(&self, io: IO) -> Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        self.state.send_replace(HandshakeState::Handshaking);

        let handshake = async {
            match &self.policy {
                TlsPolicy::Server(config) => TlsAcceptor::from(Arc::clone(config))
                    .accept(io)
                    .await
                    .map(TlsStream::from),
                TlsPolicy::Client {
                    config,
                    server_name,
                } => TlsConnector::from(Arc::clone(config))
                    .connect(server_name.clone(), io)
                    .await
                    .map(TlsStream::from),
            }
        };

        match tokio::time::timeout(self.handshake_timeout, handshake).await {
            Ok(Ok(stream)) => {
                self.state.send_replace(HandshakeState::Established);
                Ok(stream)
            }
            Ok(Err(e)) => Err(self.fail(TransportError::handshake(e))),
            Err(_) => Err(self.fail(TransportError::handshake(format!(
                "no handshake within {:?}",
                self.handshake_timeout
            )))),
        }
    }

    /// Mark an unfinished handshake as failed.
    pub(crate) fn abort(&self, reason: &str) {
        let unfinished = matches!(
            self.state(),
            HandshakeState::NotStarted | HandshakeState::Handshaking
        );
        if unfinished {
            self.fail(TransportError::handshake(reason));
        }
    }

    fn fail(&self, err: TransportError) -> TransportError {
        let err = self.failure.get_or_init(|| err).clone();
        self.state.send_replace(HandshakeState::Failed);
        tracing::debug!(error = %err, "TLS handshake failed");
        err
    }

    fn failure(&self) -> TransportError {
        self.failure
            .get()
            .cloned()
            .unwrap_or_else(|| TransportError::handshake("handshake abandoned"))
    }
}
