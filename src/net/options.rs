//! Per-session options.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{NetConfig, StreamConfig};
use crate::error::Result;
use crate::stream::wiretap::{LoggingWiretap, WireObserver};
use crate::tls::TlsPolicy;

/// Options applied to every session created by a connect or a listener.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Read buffer size and credit of the session's ByteStream.
    pub stream: StreamConfig,
    /// Deadline for the TCP handshake of `connect`.
    pub connect_timeout: Duration,
    /// Deadline for the TLS handshake.
    pub handshake_timeout: Duration,
    /// Secure every session with this policy.
    pub tls: Option<TlsPolicy>,
    /// Observer for raw wire traffic.
    pub wiretap: Option<Arc<dyn WireObserver>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            connect_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            tls: None,
            wiretap: None,
        }
    }
}

impl SessionOptions {
    /// Plain options from configuration (no TLS).
    pub fn from_config(config: &NetConfig) -> Self {
        let wiretap: Option<Arc<dyn WireObserver>> = config
            .observability
            .wiretap
            .then(|| Arc::new(LoggingWiretap) as Arc<dyn WireObserver>);
        Self {
            stream: config.stream.clone(),
            connect_timeout: Duration::from_millis(config.timeouts.connect_ms),
            handshake_timeout: Duration::from_millis(config.timeouts.handshake_ms),
            tls: None,
            wiretap,
        }
    }

    /// Listener-side options, secured when the config has a `[tls]` section.
    pub fn server_from_config(config: &NetConfig) -> Result<Self> {
        let mut options = Self::from_config(config);
        if let Some(tls) = &config.tls {
            options.tls = Some(TlsPolicy::server_from_config(tls)?);
        }
        Ok(options)
    }

    /// Connecting-side options, secured when the config has a `[tls]` section.
    pub fn client_from_config(config: &NetConfig) -> Result<Self> {
        let mut options = Self::from_config(config);
        if let Some(tls) = &config.tls {
            options.tls = Some(TlsPolicy::client_from_config(tls)?);
        }
        Ok(options)
    }

    pub fn secure(mut self, policy: TlsPolicy) -> Self {
        self.tls = Some(policy);
        self
    }

    pub fn wiretap(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.wiretap = Some(observer);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }
}
