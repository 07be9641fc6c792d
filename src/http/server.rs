//! HTTP/1.1 server over transport sessions.
//!
//! # Responsibilities
//! - Bind a listener and serve every accepted session with hyper's HTTP/1.1 engine
//! - Wire up middleware (tracing, compression)
//! - Dispatch requests to the route table
//!
//! # Data Flow
//! ```text
//! TransportSession → SessionIo → TokioIo → hyper http1
//!     → TraceLayer → CompressionLayer(CompressionPolicy) → RouterService → handler
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, Request};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ListenerConfig, NetConfig};
use crate::error::{Result, TransportError};
use crate::http::request::{HttpRequest, RemoteAddr};
use crate::http::response::HttpResponse;
use crate::http::router::RouterBuilder;
use crate::http::service::{CompressionPolicy, RouterService};
use crate::net::listener::Listener;
use crate::net::options::SessionOptions;
use crate::net::server::{serve, DisposableServer};
use crate::net::session::TransportSession;
use crate::runtime::EventLoopGroup;
use crate::stream::wiretap::WireObserver;
use crate::tls::TlsPolicy;

/// Builder for an HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    listener: ListenerConfig,
    options: SessionOptions,
    routes: RouterBuilder,
    compression: CompressionPolicy,
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServer {
    /// Server on `127.0.0.1:0`, no routes, no compression.
    pub fn new() -> Self {
        Self {
            listener: ListenerConfig::default(),
            options: SessionOptions::default(),
            routes: RouterBuilder::default(),
            compression: CompressionPolicy::default(),
        }
    }

    /// Listener, session, TLS and compression settings from configuration.
    pub fn from_config(config: &NetConfig) -> Result<Self> {
        Ok(Self {
            listener: config.listener.clone(),
            options: SessionOptions::server_from_config(config)?,
            routes: RouterBuilder::default(),
            compression: CompressionPolicy::from_config(&config.http),
        })
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.listener.bind_address = addr.to_string();
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn secure(mut self, policy: TlsPolicy) -> Self {
        self.options.tls = Some(policy);
        self
    }

    pub fn wiretap(mut self, observer: Arc<dyn WireObserver>) -> Self {
        self.options.wiretap = Some(observer);
        self
    }

    /// Enable or disable response compression.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compression.enabled = enabled;
        self
    }

    /// Smallest body size that gets compressed.
    pub fn min_compress_size(mut self, bytes: u64) -> Self {
        self.compression.min_size = bytes;
        self
    }

    /// Replace the route table under construction.
    pub fn routes(mut self, routes: RouterBuilder) -> Self {
        self.routes = routes;
        self
    }

    pub fn route<F, Fut>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes = self.routes.route(method, pattern, handler);
        self
    }

    pub fn get<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    /// Handle every request with `handler`, whatever its method and path.
    pub fn handle<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.routes = self.routes.fallback(handler);
        self
    }

    /// Bind the listener and start serving.
    pub async fn bind(self, group: &EventLoopGroup) -> Result<DisposableServer> {
        let router = Arc::new(self.routes.build()?);
        let mut listener = Listener::from_config(group, &self.listener, &self.options).await?;
        let sessions = listener.accept_loop()?;
        let server = DisposableServer::new(&listener);

        let service = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new().compress_when(self.compression))
            .service(RouterService::new(router));

        let handler = move |session: TransportSession| {
            let service = service.clone();
            async move {
                let session_id = session.id();
                let remote = RemoteAddr(session.peer_addr());
                let service = ServiceBuilder::new()
                    .map_request(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(remote);
                        request
                    })
                    .service(service);
                let io = TokioIo::new(session.into_io());
                let connection = http1::Builder::new()
                    .serve_connection(io, TowerToHyperService::new(service));
                if let Err(e) = connection.await {
                    tracing::debug!(session_id = %session_id, error = %e, "HTTP connection ended with error");
                }
                Ok::<(), TransportError>(())
            }
        };

        serve(group, &listener, sessions, Arc::new(handler))?;
        tracing::info!(address = %server.local_addr(), "HTTP server listening");
        Ok(server)
    }
}
