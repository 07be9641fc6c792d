//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS session
//!     → server.rs (hyper HTTP/1.1 over SessionIo, middleware)
//!     → service.rs (tower adapter, compression policy)
//!     → router.rs (method + pattern lookup, dispatch)
//!     → pattern.rs (segment matching, parameter binding)
//!     → handler(HttpRequest, HttpResponse)
//! ```

pub mod pattern;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod service;

pub use pattern::{PathParams, PatternError, RoutePattern};
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use router::{Handler, HandlerFuture, HttpRouter, RouteMatch, RouterBuilder};
pub use server::HttpServer;
pub use service::{CompressionPolicy, RouterService};
