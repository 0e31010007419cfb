//! Rate limit middleware.
//! Counts every gateway request against its route's rule.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::clock::Clock;
use crate::http::request::{client_identifier, request_id};
use crate::http::response::{apply_rate_limit_headers, rate_limited};
use crate::http::server::AppState;

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let inner = state.inner.load_full();
    if !inner.config.rate_limit.enabled {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identifier = client_identifier(req.headers(), peer);
    let (route_key, rule) = inner.router.rate_limit_for(req.uri().path());
    let route_key = route_key.to_string();

    let decision = state
        .limiter
        .check_rate_limit(&route_key, &identifier, &rule)
        .await;

    if !decision.allowed {
        tracing::info!(
            request_id = %request_id(req.headers()),
            route = %route_key,
            identifier = %identifier,
            "Request rate limited"
        );
        return rate_limited(&decision, state.limiter.clock().now_ms());
    }

    let mut response = next.run(req).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}
