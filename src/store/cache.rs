//! Ephemeral key-value cache with per-entry TTL.
//!
//! The fast side of the dual onboarding state store. Entries may vanish
//! at any time (eviction, restart); callers must tolerate misses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StateError;

/// Ephemeral store abstraction. Implementations hold JSON values keyed
/// by string, each with a TTL after which the entry is gone.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError>;

    async fn set_with_ttl(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StateError>;

    async fn delete(&self, key: &str) -> Result<(), StateError>;
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process TTL cache backed by a `RwLock<HashMap>`. Expired entries
/// are dropped lazily on read and opportunistically swept on write.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StateError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Entry exists but is expired; remove it under the write lock.
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StateError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("k", json!({"step": "welcome"}), Duration::from_secs(60))
            .await
            .unwrap();

        let value = cache.get("k").await.unwrap().unwrap();
        assert_eq!(value["step"], "welcome");

        cache.delete("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("k", json!(1), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert!(cache.get("nope").await.unwrap().is_none());
    }
}
