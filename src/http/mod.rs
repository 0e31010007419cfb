//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, concurrency cap)
//!     → middleware/rate_limit.rs (admit or 429)
//!     → routing (match path prefix → upstream)
//!     → server.rs (forward through the upstream's circuit breaker)
//!     → response.rs (error mapping, rate limit headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::{AppState, HttpServer};
