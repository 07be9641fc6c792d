//! Event loop runtime.
//!
//! # Data Flow
//! ```text
//! EventLoopGroup::create(name, size)
//!     → group.rs (one thread + current-thread runtime per loop)
//!     → assign() hands out LoopHandles round-robin
//!     → LoopHandle::spawn queues work, task.rs resolves its output
//! ```
//!
//! # Design Decisions
//! - Every session is pinned to exactly one loop for its whole life
//! - Anything crossing loops is sent as a message, never run in place

pub mod group;
pub mod shutdown;
pub mod task;

pub use group::{EventLoopGroup, LoopHandle, LoopId};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use task::LoopTask;
