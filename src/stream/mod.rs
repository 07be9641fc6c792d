//! ByteStream: the bidirectional, credit-based frame channel of a session.
//!
//! # Data Flow
//! ```text
//! socket ──read pump──▶ bounded queue ──▶ Inbound (next_frame / Stream)
//! Outbound::send ──▶ bounded queue ──write pump──▶ socket ──ack──▶ caller
//! ```
//!
//! # Design Decisions
//! - Inbound credit: the socket is read only while the queue has room
//! - Outbound credit: a send resolves after its frame was written, so a
//!   producer waits for the previous write before the next
//! - `SessionIo` exposes the same stream as `AsyncRead + AsyncWrite`

pub mod file;
pub mod frames;
pub mod inbound;
pub mod io;
pub mod outbound;
pub mod wiretap;

pub use file::{file_frames, DEFAULT_FILE_CHUNK};
pub use frames::{FrameStream, FrameStreamExt};
pub use inbound::Inbound;
pub use io::SessionIo;
pub use outbound::Outbound;
pub use wiretap::{LoggingWiretap, WireObserver};
