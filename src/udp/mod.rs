//! Datagram (UDP) sessions.
//!
//! # Data Flow
//! ```text
//! UdpSocket (owned by the driver on its loop)
//!     → recv_from → DatagramStream (Ok(datagram) | Err(receive error))
//!     ← send_to   ← DatagramSender (datagram + completion ack)
//! ```
//!
//! # Design Decisions
//! - No handshake: a session is usable as soon as `bind` returns
//! - Receive errors are items of the stream, not its end
//! - Same disposal contract as TCP sessions

pub mod datagram;
pub mod session;

pub use datagram::Datagram;
pub use session::{DatagramSender, DatagramSession, DatagramStream, UdpOptions};
