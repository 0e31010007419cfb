//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerConfig;
use crate::security::rate_limit::RateLimitRule;

/// Root configuration for the resilience gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Defaults applied to every upstream circuit breaker.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Route definitions mapping requests to upstreams.
    pub routes: Vec<RouteConfig>,

    /// Upstream service definitions.
    pub upstreams: Vec<UpstreamConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Effective breaker configuration for an upstream.
    pub fn breaker_config(&self, upstream: &UpstreamConfig) -> CircuitBreakerConfig {
        upstream
            .circuit_breaker
            .as_ref()
            .unwrap_or(&self.circuit_breaker)
            .to_breaker_config(&upstream.name)
    }

    pub fn upstream(&self, name: &str) -> Option<&UpstreamConfig> {
        self.upstreams.iter().find(|u| u.name == name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for a client request, in seconds.
    pub request_secs: u64,

    /// Time allowed for a single upstream exchange, in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable the rate limit middleware.
    pub enabled: bool,

    /// Window applied to routes without their own rule, in milliseconds.
    pub default_window_ms: u64,

    /// Requests per window for routes without their own rule.
    pub default_max_requests: u64,

    /// Interval between in-process cleanup sweeps, in seconds.
    pub cleanup_interval_secs: u64,

    /// Counter store selection.
    pub store: RateLimitStoreConfig,
}

impl RateLimitConfig {
    pub fn default_rule(&self) -> RateLimitRule {
        RateLimitRule::new(Duration::from_millis(self.default_window_ms), self.default_max_requests)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_window_ms: 60_000,
            default_max_requests: 100,
            cleanup_interval_secs: 300,
            store: RateLimitStoreConfig::default(),
        }
    }
}

/// Counter store selection. Presence of credentials picks the tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitStoreConfig {
    /// Redis connection string (overridden by `REDIS_URL`).
    pub redis_url: Option<String>,

    /// Managed KV REST endpoint (overridden by `KV_REST_API_URL`).
    pub kv_rest_url: Option<String>,

    /// Managed KV bearer token (overridden by `KV_REST_API_TOKEN`).
    pub kv_rest_token: Option<String>,

    /// Prefix for every counter key.
    pub key_prefix: String,
}

impl Default for RateLimitStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            kv_rest_url: None,
            kv_rest_token: None,
            key_prefix: "ratelimit".to_string(),
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub success_threshold: u32,
    /// Reserved; accepted for compatibility.
    pub reset_timeout_ms: u64,
    /// Per-call deadline. Unset means calls may run indefinitely.
    pub call_timeout_ms: Option<u64>,
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self, name: &str) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(name)
            .with_failure_threshold(self.failure_threshold)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_success_threshold(self.success_threshold)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
            .with_call_timeout(self.call_timeout_ms.map(Duration::from_millis))
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_ms: 60_000,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            call_timeout_ms: None,
        }
    }
}

/// Route configuration mapping requests to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier; also the rate limit route key.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Upstream name to forward to.
    pub upstream: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Route-specific limit; falls back to the rate limit defaults.
    #[serde(default)]
    pub rate_limit: Option<RouteRateLimit>,
}

/// Per-route rate limit.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RouteRateLimit {
    pub window_ms: u64,
    pub max_requests: u64,
}

impl From<RouteRateLimit> for RateLimitRule {
    fn from(r: RouteRateLimit) -> Self {
        RateLimitRule::new(Duration::from_millis(r.window_ms), r.max_requests)
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Unique upstream identifier; also the circuit breaker name.
    pub name: String,

    /// Base URL requests are forwarded to (e.g., "http://127.0.0.1:3000").
    pub base_url: String,

    /// Overrides for the default breaker thresholds.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
