//! Key/value storage adapters for guest records and their indexes.
//!
//! Every backend implements [`StorageAdapter`]: get, set with a TTL, delete
//! and prefix scan over JSON values. A missing or expired key is a normal
//! `None`, never an error; only backend failures surface as
//! [`GuestError::BackendUnavailable`](crate::GuestError::BackendUnavailable).
//!
//! # Backends
//!
//! - [`MemoryStorage`]: ordered in-process map with manual expiry bookkeeping.
//!   Single instance, lost on restart.
//! - [`CacheStorage`]: bounded in-process cache with LRU eviction, lazy expiry
//!   and hit/miss statistics. Single instance; the default.
//! - [`RedisStorage`] (feature `redis`): shared across instances, values stored
//!   as JSON text, expiry handled by Redis itself.

pub mod cache;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_storage;

pub use cache::{CacheStats, CacheStorage};
pub use memory::MemoryStorage;
#[cfg(feature = "redis")]
pub use redis_storage::RedisStorage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GuestError, Result};
use crate::settings::SdkSettings;

/// Upper bound on any entry's lifetime (100 years). Longer TTLs are clamped
/// so expiry deadlines stay representable.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline for an entry written at `now` with `ttl`.
pub(crate) fn expiry_deadline(now: tokio::time::Instant, ttl: Duration) -> tokio::time::Instant {
    now + ttl.min(MAX_ENTRY_TTL)
}

/// Uniform key/value contract shared by all backends.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Value stored under `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`. `None` applies the adapter's default TTL.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`, returning whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every live value whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Value>>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Which storage backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Cache,
    Redis,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Cache => "cache",
            StorageBackend::Redis => "redis",
        };
        f.write_str(name)
    }
}

impl FromStr for StorageBackend {
    type Err = GuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "cache" => Ok(StorageBackend::Cache),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(GuestError::InvalidArgument(format!(
                "unknown storage backend '{}' (expected memory, cache or redis)",
                other
            ))),
        }
    }
}

/// Construct the storage adapter selected in settings.
pub async fn build_storage(settings: &SdkSettings) -> Result<Arc<dyn StorageAdapter>> {
    let ttl = Duration::from_secs(settings.guest.ttl_secs);

    let storage: Arc<dyn StorageAdapter> = match settings.guest.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::with_default_ttl(ttl)),
        StorageBackend::Cache => Arc::new(CacheStorage::with_capacity(
            settings.guest.cache_max_entries,
            ttl,
        )),
        #[cfg(feature = "redis")]
        StorageBackend::Redis => {
            let url = settings.redis.url.as_deref().ok_or_else(|| {
                GuestError::InvalidArgument("redis backend selected but redis.url is not set".into())
            })?;
            Arc::new(RedisStorage::connect(url, settings.redis.key_prefix.clone(), ttl).await?)
        }
        #[cfg(not(feature = "redis"))]
        StorageBackend::Redis => {
            return Err(GuestError::InvalidArgument(
                "redis backend selected but the `redis` feature is not enabled".into(),
            ))
        }
    };

    tracing::info!(backend = storage.backend_name(), ttl_secs = ttl.as_secs(), "Guest storage ready");
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_ttl_is_clamped() {
        let now = tokio::time::Instant::now();
        assert_eq!(
            expiry_deadline(now, Duration::from_secs(u64::MAX)),
            now + MAX_ENTRY_TTL
        );
        assert_eq!(
            expiry_deadline(now, Duration::from_secs(30)),
            now + Duration::from_secs(30)
        );
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert_eq!(" cache ".parse::<StorageBackend>().unwrap(), StorageBackend::Cache);
        assert_eq!("REDIS".parse::<StorageBackend>().unwrap(), StorageBackend::Redis);
    }

    #[test]
    fn unknown_backend_is_invalid_argument() {
        let err = "sqlite".parse::<StorageBackend>().unwrap_err();
        assert!(matches!(err, GuestError::InvalidArgument(_)));
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn backend_display_round_trips_through_serde_names() {
        for backend in [StorageBackend::Memory, StorageBackend::Cache, StorageBackend::Redis] {
            let json = serde_json::to_value(backend).unwrap();
            assert_eq!(json, Value::String(backend.to_string()));
        }
    }

    #[tokio::test]
    async fn build_storage_defaults_to_cache() {
        let settings = SdkSettings::default();
        let storage = build_storage(&settings).await.unwrap();
        assert_eq!(storage.backend_name(), "cache");
    }

    #[tokio::test]
    async fn build_storage_memory_backend() {
        let mut settings = SdkSettings::default();
        settings.guest.backend = StorageBackend::Memory;
        let storage = build_storage(&settings).await.unwrap();
        assert_eq!(storage.backend_name(), "memory");
    }

    #[tokio::test]
    async fn build_storage_redis_requires_url() {
        let mut settings = SdkSettings::default();
        settings.guest.backend = StorageBackend::Redis;
        settings.redis.url = None;
        let err = build_storage(&settings).await.err().unwrap();
        assert!(matches!(err, GuestError::InvalidArgument(_)));
    }
}
