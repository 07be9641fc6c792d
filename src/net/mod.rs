//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits, loop hand-off)
//!     → session.rs (TransportSession on its loop)
//!     → driver.rs (optional TLS handshake, read/write pumps)
//!     → server.rs (per-session handler) or http::server
//!
//! Session States:
//!     Active → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue and connection semaphore prevent resource exhaustion
//! - Each session tracked for graceful shutdown
//! - TLS is optional and handled transparently below the ByteStream

pub mod connection;
pub mod control;
pub(crate) mod driver;
pub mod listener;
pub mod options;
pub mod server;
pub mod session;

pub use connection::{SessionId, SessionState, SessionTracker};
pub use control::SessionHandle;
pub use listener::{AcceptStream, ConnectionPermit, Listener};
pub use options::SessionOptions;
pub use server::{DisposableServer, TcpServer};
pub use session::TransportSession;
