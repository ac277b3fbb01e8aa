//! Metrics collection and exposition.
//!
//! # Metrics
//! - `healthcheck_backend_server_up` (gauge): 1 when the last probe of a
//!   server succeeded, 0 otherwise. Labels: `backend`, `url`.
//! - `healthcheck_probes_total` (counter): probes sent. Labels: `backend`, `result`.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const SERVER_UP_GAUGE: &str = "healthcheck_backend_server_up";
pub const PROBES_COUNTER: &str = "healthcheck_probes_total";

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record the outcome of a probe against one server.
pub fn record_server_up(backend: &str, url: &str, up: bool) {
    metrics::gauge!(
        SERVER_UP_GAUGE,
        "backend" => backend.to_string(),
        "url" => url.to_string()
    )
    .set(if up { 1.0 } else { 0.0 });

    metrics::counter!(
        PROBES_COUNTER,
        "backend" => backend.to_string(),
        "result" => if up { "success" } else { "failure" }
    )
    .increment(1);
}
