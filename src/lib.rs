//! AIAS Platform resilience gateway library.
//!
//! Circuit breakers per upstream service and a distributed fixed-window
//! rate limiter, exposed as an axum gateway with an admin API.

pub mod admin;
pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerRegistry, CircuitState};
pub use security::rate_limit::{DistributedRateLimiter, RateLimitDecision, RateLimitRule};
