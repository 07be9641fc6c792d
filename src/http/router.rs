//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a method and path
//! - Run the handler, turning errors and panics into a 500
//!
//! # Design Decisions
//! - Immutable after construction (shared without locks)
//! - O(n) scan over routes (acceptable for typical route counts)
//! - Literal segments beat parameters at the earliest differing position;
//!   otherwise the first registered route wins
//! - Explicit `NoRoute` rather than a silent default

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::{Result, TransportError};
use crate::http::pattern::{PathParams, RoutePattern};
use crate::http::request::HttpRequest;
use crate::http::response::{status_response, HttpResponse};
use crate::observability::metrics;

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, Result<HttpResponse>>;

/// Something that turns a request/response pair into a finished response.
///
/// Implemented for every `Fn(HttpRequest, HttpResponse) -> impl Future<Output = Result<HttpResponse>>`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: HttpRequest, response: HttpResponse) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
{
    fn call(&self, request: HttpRequest, response: HttpResponse) -> HandlerFuture {
        Box::pin(self(request, response))
    }
}

struct Route {
    method: Method,
    pattern: RoutePattern,
    handler: Arc<dyn Handler>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

/// Outcome of a successful lookup.
pub struct RouteMatch<'a> {
    pub handler: &'a Arc<dyn Handler>,
    pub pattern: &'a RoutePattern,
    pub params: PathParams,
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern.as_str())
            .field("params", &self.params)
            .finish()
    }
}

/// Collects routes; patterns are validated by [`build`](Self::build).
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<Route>,
    fallback: Option<Arc<dyn Handler>>,
    errors: Vec<String>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl RouterBuilder {
    pub fn route<F, Fut>(mut self, method: Method, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        match RoutePattern::parse(pattern) {
            Ok(pattern) => self.routes.push(Route {
                method,
                pattern,
                handler: Arc::new(handler),
            }),
            Err(e) => self.errors.push(e.to_string()),
        }
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

    pub fn put<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn delete<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.route(Method::DELETE, pattern, handler)
    }

    /// Handler for requests no route matches.
    pub fn fallback<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(HttpRequest, HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.fallback.is_none()
    }

    pub fn build(self) -> Result<HttpRouter> {
        if !self.errors.is_empty() {
            return Err(TransportError::Config(self.errors.join(", ")));
        }
        Ok(HttpRouter {
            routes: self.routes,
            fallback: self.fallback,
        })
    }
}

/// Immutable route table.
pub struct HttpRouter {
    routes: Vec<Route>,
    fallback: Option<Arc<dyn Handler>>,
}

impl fmt::Debug for HttpRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRouter")
            .field("routes", &self.routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl HttpRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Best route for `method` and `path`.
    pub fn find(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>> {
        let mut best: Option<RouteMatch<'_>> = None;
        for route in self.routes.iter().filter(|r| r.method == *method) {
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };
            let better = best
                .as_ref()
                .map_or(true, |current| route.pattern.specificity(current.pattern).is_gt());
            if better {
                best = Some(RouteMatch {
                    handler: &route.handler,
                    pattern: &route.pattern,
                    params,
                });
            }
        }
        best.ok_or_else(|| TransportError::NoRoute {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    /// Route `request` and run its handler.
    ///
    /// `NoRoute` without a fallback becomes a 404; a handler error or panic
    /// becomes a 500.
    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        let (handler, params) = match self.find(&method, &path) {
            Ok(found) => (Arc::clone(found.handler), found.params),
            Err(e) => match &self.fallback {
                Some(fallback) => (Arc::clone(fallback), PathParams::default()),
                None => {
                    tracing::debug!(error = %e, "No route");
                    metrics::record_http_request(method.as_str(), 404, start);
                    return status_response(StatusCode::NOT_FOUND);
                }
            },
        };

        let request = HttpRequest::new(parts, body, params);
        let outcome = AssertUnwindSafe(handler.call(request, HttpResponse::new()))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response.into_response(),
            Ok(Err(e)) => {
                tracing::warn!(method = %method, path = %path, error = %e, "Handler failed");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(_) => {
                tracing::error!(method = %method, path = %path, "Handler panicked");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        metrics::record_http_request(method.as_str(), response.status().as_u16(), start);
        response
    }
}
