//! HTTP server end to end with reqwest as the client.

use std::io::Read;

use axum::http::StatusCode;
use bytes::Bytes;
use flate2::read::GzDecoder;
use netloop::stream::FrameStreamExt;
use netloop::{EventLoopGroup, HttpServer, TransportError};

mod common;

async fn start(group: &EventLoopGroup, server: HttpServer) -> String {
    let running = server
        .bind_address(common::localhost())
        .bind(group)
        .await
        .unwrap();
    format!("http://{}", running.local_addr())
}

fn greeting_server() -> HttpServer {
    HttpServer::new().post("/test/{param}", |mut req, res| async move {
        let body = req.receive().aggregate_string().await?;
        let name = req.param("param").unwrap_or_default().to_string();
        Ok(res.send_string(format!("{body} {name}!")))
    })
}

#[tokio::test]
async fn test_path_param_and_body() {
    let group = common::group("http-param");
    let base = start(&group, greeting_server()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/test/World"))
        .body("Hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Hello World!");

    group.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_paths_are_not_found() {
    let group = common::group("http-404");
    let base = start(&group, greeting_server()).await;
    let client = reqwest::Client::new();

    for path in ["/test", "/test/World/extra", "/other"] {
        let response = client.post(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
    let response = client.get(format!("{base}/test/World")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    group.shutdown().await;
}

#[tokio::test]
async fn test_handler_error_is_internal_server_error() {
    let group = common::group("http-500");
    let server = HttpServer::new().get("/fail", |_req, _res| async move {
        Err(TransportError::Config("handler gave up".into()))
    });
    let base = start(&group, server).await;

    let response = reqwest::get(format!("{base}/fail")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The connection engine survives the failure.
    let response = reqwest::get(format!("{base}/fail")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    group.shutdown().await;
}

#[tokio::test]
async fn test_gzip_compression() {
    let group = common::group("http-gzip");
    let server = HttpServer::new()
        .compress(true)
        .get("/compressed", |_req, res| async move {
            Ok(res.send_string("compressed response"))
        });
    let base = start(&group, server).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/compressed"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-encoding").unwrap(),
        "gzip"
    );

    let compressed = response.bytes().await.unwrap();
    let mut decoded = String::new();
    GzDecoder::new(compressed.as_ref())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, "compressed response");

    group.shutdown().await;
}

#[tokio::test]
async fn test_compression_disabled_by_default() {
    let group = common::group("http-plain");
    let server = HttpServer::new().get("/plain", |_req, res| async move {
        Ok(res.send_string("plain response"))
    });
    let base = start(&group, server).await;

    let response = reqwest::Client::new()
        .get(format!("{base}/plain"))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    assert!(response.headers().get("content-encoding").is_none());
    assert_eq!(response.text().await.unwrap(), "plain response");

    group.shutdown().await;
}

#[tokio::test]
async fn test_streamed_response_and_remote_addr() {
    let group = common::group("http-stream");
    let server = HttpServer::new()
        .get("/stream", |_req, res| async move {
            let frames = futures_util::stream::iter(
                ["one ", "two ", "three"].map(|s| Ok::<_, TransportError>(Bytes::from(s))),
            );
            Ok(res.send(frames))
        })
        .get("/whoami", |req, res| async move {
            let ip = req
                .remote_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default();
            Ok(res.send_string(ip))
        });
    let base = start(&group, server).await;

    let body = reqwest::get(format!("{base}/stream")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "one two three");
    let ip = reqwest::get(format!("{base}/whoami")).await.unwrap().text().await.unwrap();
    assert_eq!(ip, "127.0.0.1");

    group.shutdown().await;
}

#[tokio::test]
async fn test_fallback_handles_everything_else() {
    let group = common::group("http-fallback");
    let server = HttpServer::new()
        .get("/known", |_req, res| async move { Ok(res.send_string("known")) })
        .handle(|req, res| async move {
            Ok(res
                .status(StatusCode::ACCEPTED)
                .send_string(format!("{} {}", req.method(), req.path())))
        });
    let base = start(&group, server).await;
    let client = reqwest::Client::new();

    let known = client.get(format!("{base}/known")).send().await.unwrap();
    assert_eq!(known.text().await.unwrap(), "known");
    let other = client.delete(format!("{base}/any/thing")).send().await.unwrap();
    assert_eq!(other.status(), StatusCode::ACCEPTED);
    assert_eq!(other.text().await.unwrap(), "DELETE /any/thing");

    group.shutdown().await;
}
