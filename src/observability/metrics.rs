//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mp_proxy_attempts_total` (counter): upstream attempts by outcome
//! - `mp_proxy_retries_total` (counter): retries by reason (status, transport)
//! - `mp_proxy_exhausted_total` (counter): calls that ran out of attempts
//! - `qrcode_requests_total` (counter): inbound QR-code requests by result
//! - `kv_commits_total` (counter): atomic commits by backend and outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exposition is opt-in via configuration

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(outcome: &'static str) {
    metrics::counter!("mp_proxy_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry(reason: &'static str) {
    metrics::counter!("mp_proxy_retries_total", "reason" => reason).increment(1);
}

pub fn record_exhausted() {
    metrics::counter!("mp_proxy_exhausted_total").increment(1);
}

pub fn record_qrcode(result: &'static str) {
    metrics::counter!("qrcode_requests_total", "result" => result).increment(1);
}

pub fn record_kv_commit(backend: &'static str, ok: bool) {
    let ok = if ok { "true" } else { "false" };
    metrics::counter!("kv_commits_total", "backend" => backend, "ok" => ok).increment(1);
}
