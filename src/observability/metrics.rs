//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cellgate_requests_total` (counter): requests by method, status, operation
//! - `cellgate_request_duration_seconds` (histogram): latency distribution
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Label value for a request method. Anything the gateway does not serve is
/// folded into `other` so client-chosen methods cannot mint new series.
pub fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        _ => "other",
    }
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, op: &'static str, start: Instant) {
    let method = method_label(method);
    metrics::counter!(
        "cellgate_requests_total",
        "method" => method,
        "status" => status.to_string(),
        "op" => op
    )
    .increment(1);

    metrics::histogram!(
        "cellgate_request_duration_seconds",
        "method" => method,
        "op" => op
    )
    .record(start.elapsed().as_secs_f64());
}
