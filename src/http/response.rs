//! Response shaping.
//!
//! # Responsibilities
//! - Map gateway failures to HTTP status codes
//! - Attach rate limit headers
//!
//! # Design Decisions
//! - Error bodies are small JSON objects; internal details stay in the logs
//! - Upstream timeouts result in 504 Gateway Timeout

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::security::rate_limit::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {path}")]
    NoRoute { path: String },

    #[error("circuit open for {service}")]
    CircuitOpen { service: String },

    #[error("upstream {service} timed out")]
    UpstreamTimeout { service: String },

    #[error("upstream {service} failed: {message}")]
    Upstream { service: String, message: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoRoute { .. } => StatusCode::NOT_FOUND,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::NoRoute { .. } => json!({ "error": "No matching route found" }),
            Self::CircuitOpen { service } => json!({
                "error": "Service temporarily unavailable",
                "service": service,
            }),
            Self::UpstreamTimeout { service } => json!({
                "error": "Upstream timed out",
                "service": service,
            }),
            Self::Upstream { service, .. } => json!({
                "error": "Upstream request failed",
                "service": service,
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Set `X-RateLimit-*` headers. The reset header is epoch seconds.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_time.div_ceil(1000)));
}

/// 429 response for a denied request.
pub fn rate_limited(decision: &RateLimitDecision, now_ms: u64) -> Response {
    let body = json!({
        "error": "Too many requests",
        "remaining": decision.remaining,
        "reset_time": decision.reset_time,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, decision);
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs(now_ms)),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied() -> RateLimitDecision {
        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_time: 61_500,
            limit: 5,
            store: "memory",
        }
    }

    #[test]
    fn test_error_status_codes() {
        let open = GatewayError::CircuitOpen { service: "stripe".into() };
        assert_eq!(open.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(open.to_string(), "circuit open for stripe");

        let timeout = GatewayError::UpstreamTimeout { service: "wave".into() };
        assert_eq!(timeout.into_response().status(), StatusCode::GATEWAY_TIMEOUT);

        let failed = GatewayError::Upstream {
            service: "shopify".into(),
            message: "connection refused".into(),
        };
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limited_response() {
        let response = rate_limited(&denied(), 1_000);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers["retry-after"], "61");
        assert_eq!(headers[X_RATELIMIT_LIMIT], "5");
        assert_eq!(headers[X_RATELIMIT_REMAINING], "0");
        assert_eq!(headers[X_RATELIMIT_RESET], "62");
    }
}
