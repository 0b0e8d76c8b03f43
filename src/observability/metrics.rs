//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_upstream_attempts_total` (counter): attempts by method, outcome
//! - `gateway_upstream_attempt_duration_seconds` (histogram): per-attempt latency
//! - `gateway_bulkhead_rejected_total` (counter): attempts refused by the bulkhead
//! - `gateway_bulkhead_in_flight` (gauge): admitted attempts per upstream
//! - `gateway_rate_limited_total` (counter): requests answered with 429
//! - `gateway_rate_limit_fail_open_total` (counter): checks skipped, by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is opt-in

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_upstream_attempt(method: &str, outcome: &'static str, started: Instant) {
    counter!(
        "gateway_upstream_attempts_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("gateway_upstream_attempt_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_bulkhead_rejected(upstream: &str) {
    counter!("gateway_bulkhead_rejected_total", "upstream" => upstream.to_string()).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub fn record_bulkhead_in_flight(upstream: &str, in_flight: usize) {
    gauge!("gateway_bulkhead_in_flight", "upstream" => upstream.to_string()).set(in_flight as f64);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_rate_limit_fail_open(reason: &'static str) {
    counter!("gateway_rate_limit_fail_open_total", "reason" => reason).increment(1);
}
