use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{CircuitBreakerMetrics, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub circuits: usize,
    pub open_circuits: usize,
    pub rate_limit_backends: Vec<&'static str>,
}

#[derive(Serialize)]
pub struct RateLimitStatus {
    pub enabled: bool,
    pub backends: Vec<&'static str>,
    pub local_entries: usize,
    pub default_window_ms: u64,
    pub default_max_requests: u64,
}

#[derive(Serialize)]
pub struct CleanupSummary {
    pub removed: usize,
}

#[derive(Serialize)]
pub struct ResetSummary {
    pub reset: Vec<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.inner.load();
    let metrics = state.breakers.all_metrics();
    let open_circuits = metrics.values().filter(|m| m.state == CircuitState::Open).count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: inner.router.len(),
        circuits: metrics.len(),
        open_circuits,
        rate_limit_backends: state.limiter.backends(),
    })
}

pub async fn get_circuits(State(state): State<AppState>) -> Json<BTreeMap<String, CircuitBreakerMetrics>> {
    Json(state.breakers.all_metrics())
}

pub async fn get_circuit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitBreakerMetrics>, StatusCode> {
    state
        .breakers
        .get(&name)
        .map(|b| Json(b.metrics()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn reset_circuits(State(state): State<AppState>) -> Json<ResetSummary> {
    state.breakers.reset_all();
    tracing::info!("All circuit breakers reset via admin API");
    Json(ResetSummary {
        reset: state.breakers.names(),
    })
}

pub async fn reset_circuit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResetSummary>, StatusCode> {
    let breaker = state.breakers.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    breaker.reset();
    tracing::info!(name = %name, "Circuit breaker reset via admin API");
    Ok(Json(ResetSummary { reset: vec![name] }))
}

pub async fn get_rate_limit(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let inner = state.inner.load();
    let config = &inner.config.rate_limit;

    Json(RateLimitStatus {
        enabled: config.enabled,
        backends: state.limiter.backends(),
        local_entries: state.limiter.local_entries(),
        default_window_ms: config.default_window_ms,
        default_max_requests: config.default_max_requests,
    })
}

pub async fn cleanup_rate_limit(State(state): State<AppState>) -> Json<CleanupSummary> {
    let removed = state.limiter.cleanup().await;
    Json(CleanupSummary { removed })
}
