//! Transport security.
//!
//! # Data Flow
//! ```text
//! TlsConfig / PEM / generated identity
//!     → policy.rs (TlsPolicy: who we are, whom we trust)
//!     → secure.rs (SecureTransport: handshake state machine)
//!     → session driver wraps the socket in the negotiated TlsStream
//! ```

pub mod policy;
pub mod secure;

pub use policy::{AcceptAnyServerCert, SelfSignedIdentity, TlsPolicy};
pub use secure::{HandshakeState, SecureTransport};
