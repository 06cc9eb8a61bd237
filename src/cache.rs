//! Secmaster Redis cache (§3.5).
//!
//! Keys: `secmaster:{table}:{pk}`. Values: the JSON-encoded row as decoded
//! by the WAL reader. No TTL, no secondary indices — the cache mirrors
//! whatever PostgreSQL last committed for that row.

use crate::error::{Error, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

pub fn cache_key(table: &str, pk: &str) -> String {
    format!("secmaster:{table}:{pk}")
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, table: &str, pk: &str, value: &Value) -> Result<()>;
    async fn delete(&self, table: &str, pk: &str) -> Result<()>;
}

pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::CacheConnection { message: format!("invalid Redis URL {redis_url}: {e}") })?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::CacheConnection { message: format!("failed to connect to Redis at {redis_url}: {e}") })?;
        Ok(RedisCache { manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, table: &str, pk: &str, value: &Value) -> Result<()> {
        let mut conn = self.manager.clone();
        let encoded = serde_json::to_string(value)?;
        conn.set::<_, _, ()>(cache_key(table, pk), encoded).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, pk: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(cache_key(table, pk)).await?;
        Ok(())
    }
}

/// In-memory stand-in for [`Cache`] used by tests that exercise the cache
/// warmer and CDC consumer without a live Redis instance.
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeCache {
        entries: Mutex<std::collections::HashMap<String, Value>>,
    }

    impl FakeCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get(&self, table: &str, pk: &str) -> Option<Value> {
            self.entries.lock().unwrap().get(&cache_key(table, pk)).cloned()
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl Cache for FakeCache {
        async fn set(&self, table: &str, pk: &str, value: &Value) -> Result<()> {
            self.entries.lock().unwrap().insert(cache_key(table, pk), value.clone());
            Ok(())
        }

        async fn delete(&self, table: &str, pk: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(&cache_key(table, pk));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeCache;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = FakeCache::new();
        cache.set("markets", "BTCUSD", &json!({"status": "active"})).await.unwrap();
        assert_eq!(cache.get("markets", "BTCUSD"), Some(json!({"status": "active"})));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = FakeCache::new();
        cache.set("markets", "BTCUSD", &json!({"status": "active"})).await.unwrap();
        cache.delete("markets", "BTCUSD").await.unwrap();
        assert_eq!(cache.get("markets", "BTCUSD"), None);
    }

    #[test]
    fn cache_key_matches_documented_shape() {
        assert_eq!(cache_key("markets", "BTCUSD"), "secmaster:markets:BTCUSD");
    }
}
