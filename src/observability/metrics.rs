//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_handshakes_total` (counter): finished handshakes by `outcome`
//!   (`secured`, or the error label)
//! - `gate_handshakes_in_flight` (gauge): handshake tasks currently running
//! - `gate_accept_errors_total` (counter): raw accept failures
//! - `gate_handshake_duration_seconds` (histogram): time from accept to outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op (tests, embedding)
//! - The Prometheus exporter is opt-in via configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const HANDSHAKES_TOTAL: &str = "gate_handshakes_total";
pub const HANDSHAKES_IN_FLIGHT: &str = "gate_handshakes_in_flight";
pub const ACCEPT_ERRORS_TOTAL: &str = "gate_accept_errors_total";
pub const HANDSHAKE_DURATION: &str = "gate_handshake_duration_seconds";

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn handshake_started() {
    metrics::gauge!(HANDSHAKES_IN_FLIGHT).increment(1.0);
}

pub fn handshake_finished(outcome: &'static str, elapsed: Duration) {
    metrics::gauge!(HANDSHAKES_IN_FLIGHT).decrement(1.0);
    metrics::counter!(HANDSHAKES_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(HANDSHAKE_DURATION).record(elapsed.as_secs_f64());
}

pub fn accept_failed() {
    metrics::counter!(ACCEPT_ERRORS_TOTAL).increment(1);
}
