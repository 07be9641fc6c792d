//! Metrics collection and exposition.
//!
//! # Metrics
//! - `netloop_sessions_opened_total` / `netloop_sessions_closed_total` (counter): by kind
//! - `netloop_active_sessions` (gauge): live sessions by kind
//! - `netloop_connections_accepted_total` (counter)
//! - `netloop_bytes_total` (counter): by direction
//! - `netloop_datagrams_total` (counter): by direction
//! - `netloop_tls_handshakes_total` (counter): by outcome
//! - `netloop_http_requests_total` (counter): by method, status
//! - `netloop_http_request_duration_seconds` (histogram)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_opened(kind: &'static str) {
    metrics::counter!("netloop_sessions_opened_total", "kind" => kind).increment(1);
    metrics::gauge!("netloop_active_sessions", "kind" => kind).increment(1.0);
}

pub fn record_session_closed(kind: &'static str) {
    metrics::counter!("netloop_sessions_closed_total", "kind" => kind).increment(1);
    metrics::gauge!("netloop_active_sessions", "kind" => kind).decrement(1.0);
}

pub fn record_accepted() {
    metrics::counter!("netloop_connections_accepted_total").increment(1);
}

pub fn record_bytes(direction: &'static str, count: usize) {
    metrics::counter!("netloop_bytes_total", "direction" => direction).increment(count as u64);
}

pub fn record_datagram(direction: &'static str) {
    metrics::counter!("netloop_datagrams_total", "direction" => direction).increment(1);
}

pub fn record_handshake(outcome: &'static str) {
    metrics::counter!("netloop_tls_handshakes_total", "outcome" => outcome).increment(1);
}

pub fn record_http_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "netloop_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("netloop_http_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}
