//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an upstream service:
//!     → registry.rs (look up the breaker for that service name)
//!     → circuit_breaker.rs (admit, probe, or short-circuit)
//!     → On rejection or failure: caller-supplied fallback, if any
//! ```
//!
//! # Design Decisions
//! - Breakers are keyed by service name and live for the process lifetime
//! - The registry is injected, never a global
//! - Calls have no deadline unless `call_timeout` is configured

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics, CircuitState,
};
pub use registry::CircuitBreakerRegistry;
