//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the transport core.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NetConfig {
    /// Event loop group sizing.
    pub loops: LoopConfig,

    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Connect and handshake deadlines.
    pub timeouts: TimeoutConfig,

    /// Per-session stream buffering and credit.
    pub stream: StreamConfig,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// HTTP server settings.
    pub http: HttpConfig,

    /// UDP endpoint settings.
    pub udp: UdpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Event loop group configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Prefix for loop thread names.
    pub name: String,

    /// Number of loops. `None` uses the available hardware parallelism.
    pub size: Option<usize>,

    /// How long shutdown waits for in-flight tasks before aborting them.
    pub shutdown_grace_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: "netloop".to_string(),
            size: None,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080"). Port 0 picks an ephemeral port.
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure on accept).
    pub max_connections: usize,

    /// Accepted sessions buffered before the consumer of the accept loop picks them up.
    pub backlog: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 10_000,
            backlog: 128,
        }
    }
}

/// Deadlines for operations that must never wait forever.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect deadline in milliseconds.
    pub connect_ms: u64,

    /// TLS handshake deadline in milliseconds.
    pub handshake_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 30_000,
            handshake_ms: 10_000,
        }
    }
}

/// ByteStream buffering.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum bytes read from the socket into a single frame.
    pub read_buffer_size: usize,

    /// Frames read ahead of the consumer before socket reads pause.
    pub inbound_credit: usize,

    /// Writes queued ahead of the socket before `send` suspends.
    pub outbound_credit: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 16 * 1024,
            inbound_credit: 8,
            outbound_credit: 1,
        }
    }
}

/// TLS configuration.
///
/// Listeners use `cert_path`/`key_path` when both are set and a generated
/// self-signed certificate for `self_signed_names` otherwise. Clients trust
/// `ca_path`, or any peer when `insecure` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: Option<String>,

    /// Path to private key file (PEM).
    pub key_path: Option<String>,

    /// Subject names for the generated certificate.
    pub self_signed_names: Vec<String>,

    /// Certificate(s) a client trusts (PEM).
    pub ca_path: Option<String>,

    /// Accept any server certificate. Test/dev only.
    pub insecure: bool,

    /// Name presented by clients for SNI and verification.
    pub server_name: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            self_signed_names: vec!["localhost".to_string()],
            ca_path: None,
            insecure: false,
            server_name: "localhost".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Compress responses when the client accepts an encoding.
    pub compress: bool,

    /// Smallest response body (bytes) that gets compressed.
    pub min_compress_size: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            compress: false,
            min_compress_size: 0,
        }
    }
}

/// UDP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UdpConfig {
    /// Bind address for datagram sessions.
    pub bind_address: String,

    /// Largest payload accepted by `send` and read by `receive`.
    pub max_datagram_size: usize,

    /// Datagrams buffered ahead of the consumer.
    pub inbound_credit: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            max_datagram_size: MAX_UDP_PAYLOAD,
            inbound_credit: 64,
        }
    }
}

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Attach the logging wiretap to every session.
    pub wiretap: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            wiretap: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
