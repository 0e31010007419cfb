//! Distributed fixed-window rate limiter.
//!
//! Each check increments one counter per `(route, identifier)` and compares
//! it with the rule's limit. Counters live in the first counter store that
//! answers; a failing remote tier is skipped for that call only and the
//! in-process map always answers last.
//!
//! Windows are wall-clock based. A burst straddling a boundary can admit up
//! to `2 * max_requests - 1` requests.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::schema::RateLimitStoreConfig;
use crate::observability::metrics;
use crate::security::kv_store::KvRestStore;
use crate::security::memory_store::MemoryCounterStore;
use crate::security::redis_store::RedisCounterStore;
use crate::security::store::{CounterStore, WindowCount};

/// Limit applied to one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Window length.
    pub window: Duration,
    /// Requests allowed per window.
    pub max_requests: u64,
}

impl RateLimitRule {
    pub fn new(window: Duration, max_requests: u64) -> Self {
        Self { window, max_requests }
    }

    pub fn per_second(max_requests: u64) -> Self {
        Self::new(Duration::from_secs(1), max_requests)
    }

    pub fn per_minute(max_requests: u64) -> Self {
        Self::new(Duration::from_secs(60), max_requests)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u64,
    /// End of the current window (ms since epoch).
    pub reset_time: u64,
    /// The rule's `max_requests`.
    pub limit: u64,
    /// Counter store that answered.
    pub store: &'static str,
}

impl RateLimitDecision {
    fn from_window(window: WindowCount, rule: &RateLimitRule, store: &'static str) -> Self {
        let allowed = window.count <= rule.max_requests;
        Self {
            allowed,
            remaining: if allowed { rule.max_requests - window.count } else { 0 },
            reset_time: window.reset_time,
            limit: rule.max_requests,
            store,
        }
    }

    /// Whole seconds until the window resets, at least 1.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_time.saturating_sub(now_ms).div_ceil(1000).max(1)
    }
}

/// Rate limiter over an ordered chain of counter stores.
pub struct DistributedRateLimiter {
    remote: Vec<Arc<dyn CounterStore>>,
    local: Arc<MemoryCounterStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl DistributedRateLimiter {
    /// Build the tier chain from configuration.
    ///
    /// A remote tier that cannot be initialized is left out for the lifetime
    /// of the limiter. Per-call failures only skip it for that call.
    pub async fn from_config(config: &RateLimitStoreConfig) -> Self {
        let mut remote: Vec<Arc<dyn CounterStore>> = Vec::new();

        if let Some(url) = config.redis_url.as_deref() {
            match RedisCounterStore::connect(url).await {
                Ok(store) => remote.push(Arc::new(store)),
                Err(e) => tracing::warn!(error = %e, "Redis unavailable, rate limit tier disabled"),
            }
        }

        if let (Some(url), Some(token)) = (config.kv_rest_url.as_deref(), config.kv_rest_token.as_deref()) {
            match KvRestStore::new(url, token) {
                Ok(store) => remote.push(Arc::new(store)),
                Err(e) => tracing::warn!(error = %e, "KV client unavailable, rate limit tier disabled"),
            }
        }

        if remote.is_empty() {
            tracing::warn!(
                "No shared rate limit store configured; using the in-process map. \
                 Limits are per instance and unsuitable for multi-instance deployments."
            );
        }

        let limiter = Self::with_stores(remote, Arc::new(SystemClock))
            .with_key_prefix(config.key_prefix.clone());
        tracing::info!(backends = ?limiter.backends(), "Rate limiter initialized");
        limiter
    }

    /// Limiter over an explicit list of remote tiers. The in-process map is
    /// always appended as the final tier.
    pub fn with_stores(remote: Vec<Arc<dyn CounterStore>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            remote,
            local: Arc::new(MemoryCounterStore::new()),
            clock,
            key_prefix: "ratelimit".to_string(),
        }
    }

    /// In-process limiter only.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_stores(Vec::new(), clock)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Count one request by `identifier` against `route_key`. Never fails;
    /// store errors degrade to the next tier.
    pub async fn check_rate_limit(
        &self,
        route_key: &str,
        identifier: &str,
        rule: &RateLimitRule,
    ) -> RateLimitDecision {
        let key = format!("{}:{}:{}", self.key_prefix, route_key, identifier);
        let now = self.clock.now_ms();

        let decision = self.count(&key, rule, now).await;
        metrics::record_rate_limit_decision(route_key, decision.allowed);
        if !decision.allowed {
            tracing::debug!(
                route = %route_key,
                identifier = %identifier,
                reset_time = decision.reset_time,
                store = decision.store,
                "Rate limit exceeded"
            );
        }
        decision
    }

    async fn count(&self, key: &str, rule: &RateLimitRule, now: u64) -> RateLimitDecision {
        for store in &self.remote {
            match store.increment(key, rule.window, now).await {
                Ok(window) => return RateLimitDecision::from_window(window, rule, store.name()),
                Err(e) => {
                    tracing::warn!(
                        store = store.name(),
                        error = %e,
                        "Rate limit store failed, falling back to next tier"
                    );
                    metrics::record_store_fallback(store.name());
                }
            }
        }

        let window = self.local.increment_local(key, rule.window, now);
        RateLimitDecision::from_window(window, rule, self.local.name())
    }

    /// Purge expired in-process entries. Remote tiers rely on native TTL.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for store in &self.remote {
            removed += store.cleanup(now).await;
        }
        removed += self.local.purge_expired(now);
        if removed > 0 {
            tracing::debug!(removed, "Rate limit entries purged");
        }
        removed
    }

    /// Release remote connections.
    pub async fn close(&self) {
        for store in &self.remote {
            store.close().await;
        }
    }

    /// Tier names in the order they are tried.
    pub fn backends(&self) -> Vec<&'static str> {
        self.remote
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.local.name()))
            .collect()
    }

    /// Keys currently tracked by the in-process tier.
    pub fn local_entries(&self) -> usize {
        self.local.len()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
