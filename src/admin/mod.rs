//! Admin API: breaker inspection and reset, rate limiter housekeeping.
//! Served on its own listener; every route requires the bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuits", get(get_circuits))
        .route("/admin/circuits/reset", post(reset_circuits))
        .route("/admin/circuits/{name}", get(get_circuit))
        .route("/admin/circuits/{name}/reset", post(reset_circuit))
        .route("/admin/rate-limit", get(get_rate_limit))
        .route("/admin/rate-limit/cleanup", post(cleanup_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
