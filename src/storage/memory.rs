//! In-process storage with manual expiry bookkeeping.
//!
//! Entries live in an ordered map guarded by a `parking_lot::RwLock`. Expired
//! entries are dropped lazily when read, or in bulk via
//! [`MemoryStorage::purge_expired`]. Nothing survives a restart.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;
use tracing::instrument;

use super::{expiry_deadline, StorageAdapter};
use crate::error::Result;
use crate::guest::DEFAULT_TTL_SECS;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Ordered in-process map with per-key expiry.
#[derive(Clone)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, Entry>>>,
    default_ttl: Duration,
}

impl MemoryStorage {
    /// Create an empty store with a one-day default TTL.
    pub fn new() -> Self {
        Self::with_default_ttl(Duration::from_secs(DEFAULT_TTL_SECS))
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            default_ttl,
        }
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired memory entries");
        }
        purged
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Lazy expiry: the entry may have been rewritten since the read lock was released.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = expiry_deadline(Instant::now(), ttl.unwrap_or(self.default_ttl));
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self.entries.write().remove(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired(now)))
    }

    #[instrument(skip(self), level = "trace")]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Value>> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.value.clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemoryStorage::new();
        store.set("guest:a", json!({"id": "a"}), None).await.unwrap();
        assert_eq!(store.get("guest:a").await.unwrap(), Some(json!({"id": "a"})));
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = MemoryStorage::new();
        store.set("k", json!(1), None).await.unwrap();
        store.set("k", json!(2), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStorage::new();
        store.set("k", json!("v"), None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_prefix_only_matches_prefix() {
        let store = MemoryStorage::new();
        store.set("guest:b", json!("b"), None).await.unwrap();
        store.set("guest:a", json!("a"), None).await.unwrap();
        store.set("fp:x", json!("x"), None).await.unwrap();
        store.set("guests", json!("not a guest key"), None).await.unwrap();

        let values = store.scan_prefix("guest:").await.unwrap();
        assert_eq!(values, vec![json!("a"), json!("b")]);
    }

    mod expiry_tests {
        use super::*;

        #[tokio::test]
        async fn huge_ttl_is_accepted() {
            let store = MemoryStorage::with_default_ttl(Duration::from_secs(u64::MAX));
            store.set("k", json!("v"), None).await.unwrap();
            store.set("j", json!("w"), Some(Duration::MAX)).await.unwrap();
            assert_eq!(store.get("k").await.unwrap(), Some(json!("v")));
            assert_eq!(store.get("j").await.unwrap(), Some(json!("w")));
        }

        #[tokio::test(start_paused = true)]
        async fn entry_expires_after_ttl() {
            let store = MemoryStorage::new();
            store
                .set("k", json!("v"), Some(Duration::from_secs(10)))
                .await
                .unwrap();

            tokio::time::advance(Duration::from_secs(9)).await;
            assert_eq!(store.get("k").await.unwrap(), Some(json!("v")));

            tokio::time::advance(Duration::from_secs(2)).await;
            assert_eq!(store.get("k").await.unwrap(), None);
            // Lazy expiry removed the entry on read
            assert!(store.is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn default_ttl_applies_when_omitted() {
            let store = MemoryStorage::with_default_ttl(Duration::from_secs(5));
            store.set("k", json!("v"), None).await.unwrap();

            tokio::time::advance(Duration::from_secs(6)).await;
            assert_eq!(store.get("k").await.unwrap(), None);
        }

        #[tokio::test(start_paused = true)]
        async fn expired_entries_hidden_from_scan_and_delete() {
            let store = MemoryStorage::new();
            store
                .set("guest:old", json!("old"), Some(Duration::from_secs(1)))
                .await
                .unwrap();
            store
                .set("guest:new", json!("new"), Some(Duration::from_secs(100)))
                .await
                .unwrap();

            tokio::time::advance(Duration::from_secs(2)).await;
            assert_eq!(store.scan_prefix("guest:").await.unwrap(), vec![json!("new")]);
            assert!(!store.delete("guest:old").await.unwrap());
        }

        #[tokio::test(start_paused = true)]
        async fn purge_expired_counts_removed_entries() {
            let store = MemoryStorage::new();
            for i in 0..3 {
                store
                    .set(&format!("short:{i}"), json!(i), Some(Duration::from_secs(1)))
                    .await
                    .unwrap();
            }
            store.set("long", json!("x"), None).await.unwrap();

            tokio::time::advance(Duration::from_secs(2)).await;
            assert_eq!(store.purge_expired(), 3);
            assert_eq!(store.len(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn rewrite_refreshes_ttl() {
            let store = MemoryStorage::new();
            store
                .set("k", json!(1), Some(Duration::from_secs(10)))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(8)).await;
            store
                .set("k", json!(2), Some(Duration::from_secs(10)))
                .await
                .unwrap();
            tokio::time::advance(Duration::from_secs(8)).await;
            assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
        }
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_lose_keys() {
        let store = Arc::new(MemoryStorage::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(&format!("k:{i}"), json!(i), None).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.expect("Task should complete");
        }
        assert_eq!(store.scan_prefix("k:").await.unwrap().len(), 32);
    }
}
