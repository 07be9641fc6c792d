//! Request side of a routed exchange.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri, Version};
use futures_util::stream::{self, StreamExt};

use crate::error::TransportError;
use crate::http::pattern::PathParams;
use crate::stream::frames::FrameStream;

/// An incoming request with its resolved path parameters.
///
/// The body is not read until [`receive`](Self::receive) is consumed.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    params: PathParams,
    remote_addr: Option<SocketAddr>,
    body: Option<Body>,
}

impl HttpRequest {
    pub(crate) fn new(parts: Parts, body: Body, params: PathParams) -> Self {
        let remote_addr = parts.extensions.get::<RemoteAddr>().map(|r| r.0);
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            params,
            remote_addr,
            body: Some(body),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value bound to the `{name}` segment of the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Address of the client, when served from a session.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// The request body as a lazy frame stream.
    ///
    /// The body can be taken once; a second call yields a stream that fails
    /// with [`TransportError::StreamClosed`].
    pub fn receive(&mut self) -> FrameStream {
        match self.body.take() {
            Some(body) => body
                .into_data_stream()
                .map(|chunk| {
                    chunk.map_err(|e| TransportError::Io(Arc::new(io::Error::other(e))))
                })
                .boxed(),
            None => stream::once(async { Err(TransportError::StreamClosed) }).boxed(),
        }
    }
}

/// Request extension carrying the peer address of the serving session.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RemoteAddr(pub(crate) SocketAddr);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::frames::FrameStreamExt;
    use axum::http::Request;

    #[tokio::test]
    async fn body_is_received_once() {
        let (parts, body) = Request::post("/upload")
            .header("x-test", "1")
            .body(Body::from("payload"))
            .unwrap()
            .into_parts();
        let mut request = HttpRequest::new(parts, body, PathParams::default());

        assert_eq!(request.header("x-test"), Some("1"));
        assert_eq!(request.receive().aggregate_string().await.unwrap(), "payload");
        assert!(matches!(
            request.receive().aggregate().await,
            Err(TransportError::StreamClosed)
        ));
    }
}
