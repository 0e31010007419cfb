//! Managed key-value counter store over REST.
//!
//! Speaks the REST command dialect of hosted Redis-compatible KV services:
//! a JSON command array is POSTed to the base URL with a bearer token, and
//! the reply is `{"result": ...}` or `{"error": "..."}`.
//!
//! The update is read-modify-write from the client, so two concurrent
//! requests for the same key can lose an increment. Rate limiting tolerates
//! that; nothing here attempts to fix it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::security::store::{window_ms, CounterStore, StoreError, WindowCount};

const NAME: &str = "kv";

/// Per-request deadline for KV calls. A slow KV degrades to the next tier.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct KvReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Value stored under each key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredWindow {
    count: u64,
    reset_time: u64,
}

#[derive(Debug, Clone)]
pub struct KvRestStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl KvRestStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn command(&self, args: Value) -> Result<Option<Value>, StoreError> {
        let reply: KvReply = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match reply.error {
            Some(message) => Err(StoreError::Kv(message)),
            None => Ok(reply.result),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<StoredWindow>, StoreError> {
        let stored = match self.command(json!(["GET", key])).await? {
            Some(Value::String(raw)) => raw,
            Some(Value::Null) | None => return Ok(None),
            Some(other) => return Err(StoreError::Decode(format!("GET returned {}", other))),
        };

        match serde_json::from_str::<StoredWindow>(&stored) {
            Ok(window) => Ok(Some(window)),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Discarding unreadable rate limit entry");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl CounterStore for KvRestStore {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn increment(&self, key: &str, window: Duration, now_ms: u64) -> Result<WindowCount, StoreError> {
        let next = match self.read(key).await? {
            Some(current) if current.reset_time > now_ms => StoredWindow {
                count: current.count + 1,
                reset_time: current.reset_time,
            },
            _ => StoredWindow {
                count: 1,
                reset_time: now_ms + window_ms(window),
            },
        };

        let ttl_ms = next.reset_time.saturating_sub(now_ms).max(1);
        let value = serde_json::to_string(&next).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.command(json!(["SET", key, value, "PX", ttl_ms])).await?;

        Ok(WindowCount {
            count: next.count,
            reset_time: next.reset_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_window_wire_format() {
        let encoded = serde_json::to_string(&StoredWindow { count: 3, reset_time: 99 }).unwrap();
        assert_eq!(encoded, r#"{"count":3,"resetTime":99}"#);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let store = KvRestStore::new("https://kv.example.com/", "token").unwrap();
        assert_eq!(store.base_url, "https://kv.example.com");
    }

    #[tokio::test]
    async fn test_unreachable_kv_is_an_error() {
        // Port 9 (discard) is closed on loopback in test environments.
        let store = KvRestStore::new("http://127.0.0.1:9", "token").unwrap();
        let result = store.increment("ratelimit:r:i", Duration::from_secs(1), 0).await;
        assert!(matches!(result, Err(StoreError::Http(_))));
    }
}
