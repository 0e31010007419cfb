//! Counter store abstraction behind the rate limiter.
//!
//! # Tiers
//! ```text
//! redis_store.rs   atomic INCR + PEXPIRE on first write (preferred)
//! kv_store.rs      managed KV over REST, read-modify-write (best effort)
//! memory_store.rs  in-process map, lazy expiry (degraded fallback)
//! ```
//!
//! Exactly one tier answers a given check; there is no reconciliation
//! between tiers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCount {
    /// Requests observed in the current window, including this one.
    pub count: u64,
    /// End of the current window (ms since epoch).
    pub reset_time: u64,
}

/// Errors raised by remote counter stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("KV request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("KV store rejected command: {0}")]
    Kv(String),

    #[error("Unexpected store response: {0}")]
    Decode(String),

    #[error("Store '{0}' is closed")]
    Closed(&'static str),
}

/// A fixed-window counter backend.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short backend name for logs, metrics and the admin API.
    fn name(&self) -> &'static str;

    /// Increment the counter under `key`. The first increment of a fresh
    /// window sets its expiry to `now_ms + window`.
    async fn increment(&self, key: &str, window: Duration, now_ms: u64) -> Result<WindowCount, StoreError>;

    /// Purge expired entries, returning how many were removed.
    /// Backends with native TTL have nothing to do.
    async fn cleanup(&self, _now_ms: u64) -> usize {
        0
    }

    /// Release connections held by the backend.
    async fn close(&self) {}
}

pub(crate) fn window_ms(window: Duration) -> u64 {
    (window.as_millis() as u64).max(1)
}
