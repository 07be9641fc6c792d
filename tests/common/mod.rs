//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netloop::net::SessionId;
use netloop::stream::{Inbound, WireObserver};
use netloop::tls::{SelfSignedIdentity, TlsPolicy};
use netloop::EventLoopGroup;

/// Group with two loops, so sessions and their servers can land on different threads.
#[allow(dead_code)]
pub fn group(name: &str) -> EventLoopGroup {
    EventLoopGroup::create(name, 2).unwrap()
}

/// Loopback address with an ephemeral port.
#[allow(dead_code)]
pub fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Server policy with a fresh self-signed certificate and a client trusting only it.
#[allow(dead_code)]
pub fn tls_pair() -> (TlsPolicy, TlsPolicy) {
    let identity = SelfSignedIdentity::generate(&["localhost".to_string()]).unwrap();
    (
        identity.server_policy().unwrap(),
        identity.client_policy("localhost").unwrap(),
    )
}

/// Write `contents` to a fresh file under the system temp dir.
#[allow(dead_code)]
pub fn temp_file(contents: &[u8]) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let path = std::env::temp_dir().join(format!(
        "netloop-test-{}-{}.bin",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Fail the test instead of hanging when `future` never completes.
#[allow(dead_code)]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

/// Read frames until `len` bytes arrived.
#[allow(dead_code)]
pub async fn read_len(inbound: &mut Inbound, len: usize) -> Vec<u8> {
    let mut received = Vec::with_capacity(len);
    while received.len() < len {
        match inbound.next_frame().await.unwrap() {
            Some(frame) => received.extend_from_slice(&frame),
            None => break,
        }
    }
    received
}

/// Read frames until end-of-stream.
#[allow(dead_code)]
pub async fn read_to_end(inbound: &mut Inbound) -> Vec<u8> {
    let mut received = Vec::new();
    while let Some(frame) = inbound.next_frame().await.unwrap() {
        received.extend_from_slice(&frame);
    }
    received
}

/// Wire observer keeping every byte it sees.
#[derive(Debug, Default)]
#[allow(dead_code)]
pub struct Recorder {
    pub read: Mutex<Vec<u8>>,
    pub written: Mutex<Vec<u8>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether `needle` appears in either direction.
    pub fn saw(&self, needle: &[u8]) -> bool {
        let contains = |haystack: &[u8]| haystack.windows(needle.len()).any(|w| w == needle);
        contains(&self.read.lock().unwrap()) || contains(&self.written.lock().unwrap())
    }

    pub fn total(&self) -> usize {
        self.read.lock().unwrap().len() + self.written.lock().unwrap().len()
    }
}

impl WireObserver for Recorder {
    fn on_read(&self, _session: SessionId, data: &[u8]) {
        self.read.lock().unwrap().extend_from_slice(data);
    }

    fn on_write(&self, _session: SessionId, data: &[u8]) {
        self.written.lock().unwrap().extend_from_slice(data);
    }
}
