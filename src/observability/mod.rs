//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events: session id, loop id, addresses)
//!     → metrics.rs (counters, gauges, histograms)
//!     → stream::wiretap (optional per-session wire dumps)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Metric updates are cheap atomic operations and are no-ops until a recorder is installed
//! - Log level comes from config, overridable through `RUST_LOG`

pub mod logging;
pub mod metrics;
