//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `rate_limit_decisions_total` (counter): admissions by route, outcome
//! - `rate_limit_store_fallbacks_total` (counter): tier failures by store
//! - `circuit_breaker_transitions_total` (counter): transitions by name, state
//! - `circuit_breaker_rejections_total` (counter): short-circuited calls by name
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limit_decision(route: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "limited" };
    counter!(
        "rate_limit_decisions_total",
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_store_fallback(store: &'static str) {
    counter!("rate_limit_store_fallbacks_total", "store" => store).increment(1);
}

pub fn record_circuit_transition(name: &str, state: CircuitState) {
    counter!(
        "circuit_breaker_transitions_total",
        "name" => name.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

pub fn record_circuit_rejection(name: &str) {
    counter!("circuit_breaker_rejections_total", "name" => name.to_string()).increment(1);
}
