//! Metrics collection and exposition.
//!
//! # Metrics
//! - `poly_requests_total` (counter): requests by method and status
//! - `poly_request_duration_seconds` (histogram): dispatch latency
//! - `poly_queries_total` (counter): SQL statements by kind and cache use
//! - `poly_cache_operations_total` (counter): cache calls by driver, op, hit

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus listener on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("poly_requests_total", &labels).increment(1);
    metrics::histogram!("poly_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// `kind` is "select" or "write"; `cached` marks query-cache hits.
pub fn record_query(kind: &'static str, cached: bool) {
    metrics::counter!(
        "poly_queries_total",
        "kind" => kind,
        "cached" => if cached { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_cache_op(driver: &'static str, op: &'static str, hit: bool) {
    metrics::counter!(
        "poly_cache_operations_total",
        "driver" => driver,
        "op" => op,
        "hit" => if hit { "true" } else { "false" }
    )
    .increment(1);
}
