//! Tower adapters around the router.
//!
//! # Responsibilities
//! - Expose an [`HttpRouter`] as a `tower::Service`
//! - Decide which responses the compression layer may encode

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, HttpBody};
use axum::http::{Request, Response};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use tower::Service;
use tower_http::compression::Predicate;

use crate::config::HttpConfig;
use crate::http::router::HttpRouter;

/// `tower::Service` running every request through an [`HttpRouter`].
#[derive(Debug, Clone)]
pub struct RouterService {
    router: Arc<HttpRouter>,
}

impl RouterService {
    pub fn new(router: Arc<HttpRouter>) -> Self {
        Self { router }
    }
}

impl<B> Service<Request<B>> for RouterService
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let router = Arc::clone(&self.router);
        let request = request.map(Body::new);
        Box::pin(async move { Ok(router.dispatch(request).await) })
    }
}

/// When the compression layer may encode a response.
///
/// The codec itself (gzip, deflate) is negotiated by `tower-http` from the
/// request's `Accept-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionPolicy {
    pub enabled: bool,
    /// Responses whose exact size is known and smaller than this stay plain.
    pub min_size: u64,
}

impl CompressionPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            enabled: config.compress,
            min_size: config.min_compress_size,
        }
    }
}

impl Predicate for CompressionPolicy {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        if !self.enabled {
            return false;
        }
        match response.body().size_hint().exact() {
            Some(size) => size >= self.min_size,
            None => true,
        }
    }
}
