//! Redis-backed counter store.
//!
//! `INCR` is atomic on the server, so concurrent gateways sharing one Redis
//! see a single consistent count per key. The window expiry is armed by the
//! request that creates the key.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;

use crate::security::store::{window_ms, CounterStore, StoreError, WindowCount};

const NAME: &str = "redis";

pub struct RedisCounterStore {
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Open a multiplexed connection and verify it with `PING`.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;

        tracing::info!("Redis counter store connected");
        Ok(Self {
            conn: RwLock::new(Some(conn)),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or(StoreError::Closed(NAME))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn increment(&self, key: &str, window: Duration, now_ms: u64) -> Result<WindowCount, StoreError> {
        let mut conn = self.connection().await?;
        let window_ms = window_ms(window);

        let count: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .query_async::<()>(&mut conn)
                .await?;
        }

        let mut ttl: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        if ttl < 0 {
            // The creating request died between INCR and PEXPIRE.
            tracing::debug!(key = %key, "Re-arming rate limit key without expiry");
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(window_ms)
                .query_async::<()>(&mut conn)
                .await?;
            ttl = window_ms as i64;
        }

        Ok(WindowCount {
            count,
            reset_time: now_ms + ttl as u64,
        })
    }

    async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            tracing::info!("Redis counter store closed");
        }
    }
}

// Requires a running Redis instance.
// Run with: cargo test --features redis-tests
#[cfg(all(test, feature = "redis-tests"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redis_window_counting() {
        let store = RedisCounterStore::connect("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());

        let first = store.increment(&key, Duration::from_secs(5), 1_000).await.unwrap();
        assert_eq!(first.count, 1);
        assert!(first.reset_time > 1_000 && first.reset_time <= 6_000);

        let second = store.increment(&key, Duration::from_secs(5), 1_010).await.unwrap();
        assert_eq!(second.count, 2);

        store.close().await;
        assert!(matches!(
            store.increment(&key, Duration::from_secs(5), 1_020).await,
            Err(StoreError::Closed("redis"))
        ));
    }
}
