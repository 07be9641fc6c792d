//! Reactive transport core.
//!
//! A fixed pool of single-threaded event loops drives TCP, TLS, HTTP/1.1
//! and UDP sessions. Every session is pinned to one loop; user code talks
//! to it through bounded streams and sinks.
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────────┐
//!                 │                   EventLoopGroup                       │
//!                 │   loop-0 ─ loop-1 ─ ... ─ loop-N   (round-robin)       │
//!                 └──────┬──────────────────┬───────────────────┬──────────┘
//!                        │                  │                   │
//!               ┌────────▼───────┐  ┌───────▼────────┐  ┌───────▼────────┐
//!               │    Listener    │  │TransportSession│  │DatagramSession │
//!               │  accept loop   │  │ (TCP [+TLS])   │  │     (UDP)      │
//!               └────────┬───────┘  └───────┬────────┘  └────────────────┘
//!                        │          Inbound │ Outbound
//!               ┌────────▼───────┐  ┌───────▼────────┐
//!               │   TcpServer /  │  │   SessionIo    │
//!               │   HttpServer   │──▶ hyper + router │
//!               └────────────────┘  └────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod observability;
pub mod runtime;
pub mod stream;
pub mod tls;
pub mod udp;

pub use config::NetConfig;
pub use error::{Result, TransportError};
pub use http::{HttpRequest, HttpResponse, HttpRouter, HttpServer};
pub use net::{DisposableServer, Listener, SessionHandle, SessionOptions, TcpServer, TransportSession};
pub use runtime::{EventLoopGroup, LoopHandle, LoopId};
pub use stream::{Inbound, Outbound};
pub use tls::{SecureTransport, TlsPolicy};
pub use udp::{Datagram, DatagramSession, UdpOptions};
