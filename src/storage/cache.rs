//! Bounded in-process cache with expiry, LRU eviction and statistics.
//!
//! # Thread Safety
//!
//! - Entries live in a `DashMap`, so reads and writes on different keys do not
//!   contend on a single lock
//! - Recency and statistics are plain atomics updated without locking
//!
//! When an insert would exceed `max_entries`, expired entries are purged
//! first; if the cache is still full, the least recently used entry is
//! evicted. Finding that entry is a linear scan, which is fine for the
//! capacities guest tracking needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::instrument;

use super::{expiry_deadline, StorageAdapter};
use crate::error::Result;
use crate::guest::DEFAULT_TTL_SECS;

/// Default maximum number of cached entries
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    /// Logical access tick for LRU ordering
    last_access: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Bounded cache storage; the default backend.
#[derive(Clone)]
pub struct CacheStorage {
    entries: Arc<DashMap<String, CacheEntry>>,
    max_entries: usize,
    default_ttl: Duration,
    clock: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl CacheStorage {
    /// Create a cache with the default capacity and a one-day TTL.
    pub fn new() -> Self {
        Self::with_capacity(
            DEFAULT_CACHE_MAX_ENTRIES,
            Duration::from_secs(DEFAULT_TTL_SECS),
        )
    }

    /// Create a cache holding at most `max_entries` (minimum 1).
    pub fn with_capacity(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
            clock: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Current counters plus the live entry count.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        self.counters
            .expirations
            .fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Make room for one new key.
    fn make_room(&self, now: Instant) {
        if self.entries.len() < self.max_entries {
            return;
        }
        self.purge_expired(now);

        while self.entries.len() >= self.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            let Some(victim) = victim else { break };
            if self.entries.remove(&victim).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %victim, "Evicted least recently used cache entry");
            }
        }
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for CacheStorage {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        // Present but expired. The shard guard above is released before removal.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        if !self.entries.contains_key(key) {
            self.make_room(now);
        }

        let entry = CacheEntry {
            value,
            expires_at: expiry_deadline(now, ttl.unwrap_or(self.default_ttl)),
            last_access: AtomicU64::new(self.tick()),
        };
        self.entries.insert(key.to_string(), entry);
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    #[instrument(skip(self), level = "trace")]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Value>> {
        let now = Instant::now();
        let mut matches: Vec<(String, Value)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.into_iter().map(|(_, value)| value).collect())
    }

    fn backend_name(&self) -> &'static str {
        "cache"
    }
}
