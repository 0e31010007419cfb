//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing upstreams)
//! - Validate value ranges (thresholds and windows > 0, addresses parse)
//! - Detect duplicate names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CircuitBreakerSettings, GatewayConfig};

/// A single semantic problem, tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be greater than 0"));
    } else if config.timeouts.request_secs > 0 && config.timeouts.upstream_secs >= config.timeouts.request_secs {
        // The request deadline must not fire before the upstream call resolves.
        errors.push(ValidationError::new(
            "timeouts.upstream_secs",
            "must be less than timeouts.request_secs",
        ));
    }
    let request_ms = config.timeouts.request_secs.saturating_mul(1000);

    let rl = &config.rate_limit;
    if rl.default_window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.default_window_ms", "must be greater than 0"));
    }
    if rl.default_max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.default_max_requests", "must be greater than 0"));
    }
    if rl.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.cleanup_interval_secs", "must be greater than 0"));
    }
    if let Some(url) = &rl.store.redis_url {
        match Url::parse(url) {
            Ok(u) if u.scheme() == "redis" || u.scheme() == "rediss" => {}
            _ => errors.push(ValidationError::new(
                "rate_limit.store.redis_url",
                "must be a redis:// or rediss:// URL",
            )),
        }
    }
    if let Some(url) = &rl.store.kv_rest_url {
        check_url(&mut errors, "rate_limit.store.kv_rest_url", url, &["http", "https"]);
        if rl.store.kv_rest_token.is_none() {
            errors.push(ValidationError::new(
                "rate_limit.store.kv_rest_token",
                "required when kv_rest_url is set",
            ));
        }
    }
    if rl.store.key_prefix.is_empty() {
        errors.push(ValidationError::new("rate_limit.store.key_prefix", "must not be empty"));
    }

    check_breaker(&mut errors, "circuit_breaker", &config.circuit_breaker, request_ms);

    let mut upstream_names = HashSet::new();
    for (i, upstream) in config.upstreams.iter().enumerate() {
        let field = format!("upstreams[{}]", i);
        if upstream.name.is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !upstream_names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate upstream '{}'", upstream.name),
            ));
        }
        // The forwarding client speaks plain HTTP only.
        check_url(&mut errors, &format!("{}.base_url", field), &upstream.base_url, &["http"]);
        if let Some(cb) = &upstream.circuit_breaker {
            check_breaker(&mut errors, &format!("{}.circuit_breaker", field), cb, request_ms);
        }
    }

    let mut route_names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if route.name.is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !route_names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate route '{}'", route.name),
            ));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{}.path_prefix", field),
                "must start with '/'",
            ));
        }
        if !upstream_names.contains(route.upstream.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.upstream", field),
                format!("unknown upstream '{}'", route.upstream),
            ));
        }
        if let Some(limit) = &route.rate_limit {
            if limit.window_ms == 0 {
                errors.push(ValidationError::new(
                    format!("{}.rate_limit.window_ms", field),
                    "must be greater than 0",
                ));
            }
            if limit.max_requests == 0 {
                errors.push(ValidationError::new(
                    format!("{}.rate_limit.max_requests", field),
                    "must be greater than 0",
                ));
            }
        }
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_breaker(errors: &mut Vec<ValidationError>, field: &str, cb: &CircuitBreakerSettings, request_ms: u64) {
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new(format!("{}.failure_threshold", field), "must be greater than 0"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new(format!("{}.success_threshold", field), "must be greater than 0"));
    }
    if cb.timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{}.timeout_ms", field), "must be greater than 0"));
    }
    match cb.call_timeout_ms {
        Some(0) => errors.push(ValidationError::new(format!("{}.call_timeout_ms", field), "must be greater than 0")),
        Some(ms) if request_ms > 0 && ms >= request_ms => errors.push(ValidationError::new(
            format!("{}.call_timeout_ms", field),
            "must be less than timeouts.request_secs",
        )),
        _ => {}
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, addr: &str) {
    if addr.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}'", addr)));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, url: &str, schemes: &[&str]) {
    match Url::parse(url) {
        Ok(u) if schemes.contains(&u.scheme()) => {}
        Ok(u) => errors.push(ValidationError::new(field, format!("unsupported scheme '{}'", u.scheme()))),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}
