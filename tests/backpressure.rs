//! Flow control: inbound credit, pending sends on disposal, connection limits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netloop::config::StreamConfig;
use netloop::{DisposableServer, EventLoopGroup, SessionOptions, TcpServer, TransportError, TransportSession};
use tokio::sync::{mpsc, Notify};

mod common;

const CHUNK: usize = 64 * 1024;
const CHUNKS: usize = 512;

/// Server whose handler reads nothing until `release` fires, then reports
/// the byte count and whether the `i % 251` pattern arrived intact.
async fn held_server(
    group: &EventLoopGroup,
    release: Arc<Notify>,
    report: mpsc::UnboundedSender<(usize, bool)>,
) -> DisposableServer {
    let options = SessionOptions::default().stream(StreamConfig {
        read_buffer_size: 1024,
        inbound_credit: 2,
        ..StreamConfig::default()
    });
    TcpServer::new()
        .options(options)
        .handle(group, move |mut session: TransportSession| {
            let release = Arc::clone(&release);
            let report = report.clone();
            async move {
                release.notified().await;
                let mut total = 0usize;
                let mut intact = true;
                while let Some(frame) = session.inbound().next_frame().await? {
                    for byte in frame.iter() {
                        intact &= *byte == (total % 251) as u8;
                        total += 1;
                    }
                }
                let _ = report.send((total, intact));
                Ok(())
            }
        })
        .await
        .unwrap()
}

fn pattern_chunk(index: usize) -> Vec<u8> {
    (0..CHUNK).map(|i| ((index * CHUNK + i) % 251) as u8).collect()
}

/// Wait until `progress` holds still across two samples.
async fn settled(progress: &AtomicUsize) -> usize {
    let mut last = usize::MAX;
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let now = progress.load(Ordering::SeqCst);
        if now == last && now > 0 {
            return now;
        }
        last = now;
    }
}

#[tokio::test]
async fn test_unread_inbound_suspends_sender_until_drained() {
    let group = common::group("flow-credit");
    let release = Arc::new(Notify::new());
    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let server = held_server(&group, Arc::clone(&release), report_tx).await;

    let client = TransportSession::connect(&group, server.local_addr(), &SessionOptions::default())
        .await
        .unwrap();
    let (_inbound, outbound, _handle) = client.split();
    let progress = Arc::new(AtomicUsize::new(0));
    let sent = Arc::clone(&progress);
    let writer = tokio::spawn(async move {
        for index in 0..CHUNKS {
            outbound.send(pattern_chunk(index)).await?;
            sent.fetch_add(1, Ordering::SeqCst);
        }
        outbound.close().await
    });

    let stalled = common::within(settled(&progress)).await;
    assert!(stalled < CHUNKS, "sender never suspended ({stalled} chunks sent)");
    assert!(!writer.is_finished());

    release.notify_one();
    common::within(writer).await.unwrap().unwrap();
    let (total, intact) = common::within(report_rx.recv()).await.unwrap();
    assert_eq!(total, CHUNK * CHUNKS);
    assert!(intact);

    server.dispose_now().await;
    group.shutdown().await;
}

#[tokio::test]
async fn test_pending_send_fails_when_session_disposed() {
    let group = common::group("flow-cancel");
    let release = Arc::new(Notify::new());
    let (report_tx, _report_rx) = mpsc::unbounded_channel();
    let server = held_server(&group, Arc::clone(&release), report_tx).await;

    let client = TransportSession::connect(&group, server.local_addr(), &SessionOptions::default())
        .await
        .unwrap();
    let (_inbound, outbound, handle) = client.split();
    let progress = Arc::new(AtomicUsize::new(0));
    let sent = Arc::clone(&progress);
    let writer = tokio::spawn(async move {
        let mut index = 0;
        loop {
            if let Err(err) = outbound.send(pattern_chunk(index)).await {
                return err;
            }
            index += 1;
            sent.fetch_add(1, Ordering::SeqCst);
        }
    });

    common::within(settled(&progress)).await;
    assert!(!writer.is_finished());

    handle.dispose();
    let err = common::within(writer).await.unwrap();
    assert!(
        matches!(err, TransportError::Cancelled | TransportError::StreamClosed),
        "{err:?}"
    );

    release.notify_one();
    server.dispose_now().await;
    group.shutdown().await;
}

#[tokio::test]
async fn test_max_connections_defers_extra_sessions() {
    let group = common::group("flow-limit");
    let server = TcpServer::new()
        .max_connections(1)
        .handle(&group, |session: TransportSession| async move {
            let (mut inbound, outbound, _handle) = session.split();
            while let Some(frame) = inbound.next_frame().await? {
                outbound.send(frame).await?;
            }
            Ok(())
        })
        .await
        .unwrap();
    let options = SessionOptions::default();

    let mut first = TransportSession::connect(&group, server.local_addr(), &options)
        .await
        .unwrap();
    first.outbound().send("first").await.unwrap();
    assert_eq!(common::within(common::read_len(first.inbound(), 5)).await, b"first");

    // The kernel completes the handshake, but the server holds no slot for it.
    let mut second = TransportSession::connect(&group, server.local_addr(), &options)
        .await
        .unwrap();
    second.outbound().send("second").await.unwrap();
    let early = tokio::time::timeout(Duration::from_millis(300), second.inbound().next_frame()).await;
    assert!(early.is_err(), "second session served while the first held the only slot");

    first.dispose_now().await;
    assert_eq!(common::within(common::read_len(second.inbound(), 6)).await, b"second");

    server.dispose_now().await;
    group.shutdown().await;
}
