//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NetConfig (validated, immutable)
//!     → turned into EventLoopGroup / SessionOptions / server builders
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    HttpConfig, ListenerConfig, LoopConfig, NetConfig, ObservabilityConfig, StreamConfig,
    TimeoutConfig, TlsConfig, UdpConfig,
};
