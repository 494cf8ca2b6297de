//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): finished requests by outcome
//! - `proxy_request_duration_seconds` (histogram): latency by outcome
//! - `proxy_pipeline_errors_total` (counter): fatal pipeline errors by code
//! - `proxy_open_sessions` (gauge): sessions currently registered
//! - `proxy_connection_errors_total` (counter): connection-level failures by kind
//!
//! Recording goes through the `metrics` facade, so every call is a no-op
//! until a recorder is installed by [`init_metrics`].

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request.
///
/// `outcome` is one of `service`, `piped`, `processed`, `blocked`,
/// `error` or `not_found`.
pub fn record_request(outcome: &'static str, start: Instant) {
    ::metrics::counter!("proxy_requests_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("proxy_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_pipeline_error(code: &'static str) {
    ::metrics::counter!("proxy_pipeline_errors_total", "code" => code).increment(1);
}

pub fn record_open_sessions(count: usize) {
    ::metrics::gauge!("proxy_open_sessions").set(count as f64);
}

pub fn record_connection_error(kind: &'static str) {
    ::metrics::counter!("proxy_connection_errors_total", "kind" => kind).increment(1);
}
