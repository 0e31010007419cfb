//! In-process counter store.
//!
//! Always available and never fails, which is why it sits last in the tier
//! chain. State is not shared between processes, so limits are per instance
//! when this tier answers.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::security::store::{window_ms, CounterStore, StoreError, WindowCount};

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, WindowCount>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infallible increment. An entry whose window has ended is replaced
    /// before it is consulted. The shard lock makes each update atomic.
    pub fn increment_local(&self, key: &str, window: Duration, now_ms: u64) -> WindowCount {
        let fresh = WindowCount {
            count: 0,
            reset_time: now_ms + window_ms(window),
        };

        let mut entry = self.entries.entry(key.to_string()).or_insert(fresh);
        if now_ms >= entry.reset_time {
            *entry = fresh;
        }
        entry.count += 1;
        *entry
    }

    /// Drop every entry whose window has ended.
    pub fn purge_expired(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.reset_time > now_ms);
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn increment(&self, key: &str, window: Duration, now_ms: u64) -> Result<WindowCount, StoreError> {
        Ok(self.increment_local(key, window, now_ms))
    }

    async fn cleanup(&self, now_ms: u64) -> usize {
        self.purge_expired(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_counts_within_window() {
        let store = MemoryCounterStore::new();
        let first = store.increment_local("k", MINUTE, 1_000);
        assert_eq!(first, WindowCount { count: 1, reset_time: 61_000 });

        let second = store.increment_local("k", MINUTE, 30_000);
        assert_eq!(second, WindowCount { count: 2, reset_time: 61_000 });
    }

    #[test]
    fn test_expired_entry_starts_fresh_window() {
        let store = MemoryCounterStore::new();
        store.increment_local("k", MINUTE, 0);
        store.increment_local("k", MINUTE, 1);

        let renewed = store.increment_local("k", MINUTE, 60_000);
        assert_eq!(renewed, WindowCount { count: 1, reset_time: 120_000 });
    }

    #[test]
    fn test_keys_are_independent() {
        let store = MemoryCounterStore::new();
        store.increment_local("a", MINUTE, 0);
        store.increment_local("a", MINUTE, 0);
        assert_eq!(store.increment_local("b", MINUTE, 0).count, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired() {
        let store = MemoryCounterStore::new();
        store.increment_local("old", Duration::from_secs(1), 0);
        store.increment_local("new", MINUTE, 0);

        assert_eq!(store.cleanup(5_000).await, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.increment_local("new", MINUTE, 5_000).count, 2);
    }
}
