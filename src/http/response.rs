//! Response side of a routed exchange.

use std::path::Path;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Response, StatusCode};
use bytes::Bytes;
use futures_util::Stream;

use crate::error::TransportError;
use crate::stream::file::{file_frames, DEFAULT_FILE_CHUNK};

/// Response under construction, handed to every handler.
///
/// Defaults to `200 OK` with an empty body.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header. Invalid names or values are logged and skipped.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        HeaderValue: TryFrom<V>,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid response header"),
        }
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn send_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Body::from(bytes.into());
        self
    }

    pub fn send_string(self, text: impl Into<String>) -> Self {
        let text: String = text.into();
        self.default_content_type("text/plain; charset=utf-8")
            .send_bytes(text)
    }

    /// Stream the body lazily from `frames`.
    pub fn send<S>(mut self, frames: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        self.body = Body::from_stream(frames);
        self
    }

    /// Stream a file as the body.
    pub fn send_file(self, path: impl AsRef<Path>) -> Self {
        self.default_content_type("application/octet-stream")
            .send(file_frames(path, DEFAULT_FILE_CHUNK))
    }

    fn default_content_type(mut self, value: &'static str) -> Self {
        self.headers
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(value));
        self
    }

    pub(crate) fn into_response(self) -> Response<Body> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Plain-text response with an empty or short body.
pub(crate) fn status_response(status: StatusCode) -> Response<Body> {
    HttpResponse::new()
        .status(status)
        .send_string(status.canonical_reason().unwrap_or(""))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use futures_util::stream;

    #[tokio::test]
    async fn string_body_sets_content_type() {
        let response = HttpResponse::new()
            .status(StatusCode::CREATED)
            .header("x-app", "netloop")
            .send_string("done")
            .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-app"], "netloop");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"done");
    }

    #[tokio::test]
    async fn streamed_body_is_concatenated() {
        let frames = stream::iter(vec![
            Ok::<_, TransportError>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]);
        let response = HttpResponse::new().send(frames).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ab");
    }

    #[test]
    fn invalid_header_is_skipped() {
        let response = HttpResponse::new().header("bad header", "x");
        assert!(response.headers().is_empty());
    }
}
