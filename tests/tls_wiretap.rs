//! TLS sessions observed on the wire.

use netloop::tls::{HandshakeState, SelfSignedIdentity};
use netloop::{SessionOptions, TcpServer, TransportError, TransportSession};

mod common;

const SECRET: &str = "top secret application payload";

async fn echo(session: TransportSession) -> netloop::Result<()> {
    let (mut inbound, outbound, _handle) = session.split();
    while let Some(frame) = inbound.next_frame().await? {
        outbound.send(frame).await?;
    }
    outbound.close().await
}

#[tokio::test]
async fn test_no_plaintext_on_the_wire() {
    let group = common::group("tls-wire");
    let (server_tls, client_tls) = common::tls_pair();
    let server_wire = common::Recorder::new();
    let server = TcpServer::new()
        .secure(server_tls)
        .wiretap(server_wire.clone())
        .handle(&group, echo)
        .await
        .unwrap();

    let client_wire = common::Recorder::new();
    let options = SessionOptions::default()
        .secure(client_tls)
        .wiretap(client_wire.clone());
    let mut client = TransportSession::connect(&group, server.local_addr(), &options)
        .await
        .unwrap();

    common::within(client.handshake()).await.unwrap();
    assert_eq!(client.handshake_state(), Some(HandshakeState::Established));

    client.outbound().send_string(SECRET).await.unwrap();
    let echoed = common::within(common::read_len(client.inbound(), SECRET.len())).await;
    assert_eq!(echoed, SECRET.as_bytes());

    assert!(client_wire.total() > 0);
    assert!(server_wire.total() > 0);
    assert!(!client_wire.saw(SECRET.as_bytes()));
    assert!(!server_wire.saw(SECRET.as_bytes()));

    group.shutdown().await;
}

#[tokio::test]
async fn test_plain_sessions_show_plaintext() {
    let group = common::group("plain-wire");
    let server = TcpServer::new().handle(&group, echo).await.unwrap();

    let wire = common::Recorder::new();
    let options = SessionOptions::default().wiretap(wire.clone());
    let mut client = TransportSession::connect(&group, server.local_addr(), &options)
        .await
        .unwrap();
    client.outbound().send_string(SECRET).await.unwrap();
    common::within(common::read_len(client.inbound(), SECRET.len())).await;

    assert_eq!(&*wire.written.lock().unwrap(), SECRET.as_bytes());
    assert_eq!(&*wire.read.lock().unwrap(), SECRET.as_bytes());

    group.shutdown().await;
}

#[tokio::test]
async fn test_untrusted_certificate_fails_handshake() {
    let group = common::group("tls-untrusted");
    let (server_tls, _) = common::tls_pair();
    let server = TcpServer::new()
        .secure(server_tls)
        .handle(&group, echo)
        .await
        .unwrap();

    let stranger = SelfSignedIdentity::generate(&["localhost".to_string()]).unwrap();
    let options = SessionOptions::default().secure(stranger.client_policy("localhost").unwrap());
    let mut client = TransportSession::connect(&group, server.local_addr(), &options)
        .await
        .unwrap();

    let err = common::within(client.handshake()).await.unwrap_err();
    assert!(matches!(err, TransportError::HandshakeFailed { .. }), "{err:?}");
    assert_eq!(client.handshake_state(), Some(HandshakeState::Failed));

    let read = common::within(client.inbound().next_frame()).await;
    assert!(matches!(read, Err(TransportError::HandshakeFailed { .. })));
    let write = client.outbound().send("after failure").await.unwrap_err();
    assert!(matches!(write, TransportError::HandshakeFailed { .. }));

    group.shutdown().await;
}
