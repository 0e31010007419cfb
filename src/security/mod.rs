//! Security subsystem: request admission.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → http/middleware/rate_limit.rs (derive route key + identifier)
//!     → rate_limit.rs (fixed-window check)
//!         → redis_store.rs   (shared, atomic INCR)
//!         → kv_store.rs      (shared, REST read-modify-write)
//!         → memory_store.rs  (per instance, always answers)
//!     → Pass to routing or reject with 429
//! ```
//!
//! # Design Decisions
//! - Fail open on store errors: a broken tier degrades to the next one
//! - Counters carry their own window end so every tier reports the same reset time

pub mod kv_store;
pub mod memory_store;
pub mod rate_limit;
pub mod redis_store;
pub mod store;

pub use rate_limit::{DistributedRateLimiter, RateLimitDecision, RateLimitRule};
pub use store::{CounterStore, StoreError, WindowCount};
