//! Redis-backed storage for multi-instance deployments.
//!
//! Values are stored as JSON text with `SET .. EX`, so expiry is handled by
//! Redis. Prefix scans use `SCAN MATCH` followed by `MGET` in batches.
//! Connectivity failures, and undecodable values read by key, surface as
//! [`GuestError::BackendUnavailable`] and are not retried here. Prefix scans
//! skip undecodable values with a warning.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::instrument;

use super::{StorageAdapter, MAX_ENTRY_TTL};
use crate::error::{GuestError, Result};

/// Keys fetched per `SCAN` round trip (a hint to Redis)
const SCAN_COUNT: usize = 200;

/// Keys fetched per `MGET`
const MGET_BATCH: usize = 100;

/// Storage adapter over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStorage {
    connection: MultiplexedConnection,
    key_prefix: String,
    default_ttl: Duration,
}

impl RedisStorage {
    /// Connect to Redis using a URL.
    ///
    /// The URL format follows the Redis convention:
    /// `redis://[username:password@]host[:port][/database]`.
    /// `key_prefix` is prepended to every key so several deployments can share
    /// one database.
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            GuestError::BackendUnavailable(format!("failed to parse redis URL: {}", e))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GuestError::BackendUnavailable(format!("failed to connect: {}", e)))?;

        Ok(Self::from_connection(connection, key_prefix, default_ttl))
    }

    /// Wrap an existing multiplexed connection.
    pub fn from_connection(
        connection: MultiplexedConnection,
        key_prefix: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
            default_ttl,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Collect every key matching `prefix*`, deduplicated (SCAN may repeat keys).
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// Escape Redis glob metacharacters so a prefix matches literally.
pub(crate) fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn decode(key: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| {
        GuestError::BackendUnavailable(format!("corrupt value at '{}': {}", key, e))
    })
}

/// Decode an `MGET` reply, dropping nils and corrupt values.
///
/// A key can expire between SCAN and MGET; those come back as nil.
fn decode_batch(keys: &[String], raws: Vec<Option<String>>) -> Vec<Value> {
    keys.iter()
        .zip(raws)
        .filter_map(|(key, raw)| match decode(key, &raw?) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, "Skipping undecodable value: {}", e);
                None
            }
        })
        .collect()
}

/// `SET .. EX` needs at least one second.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.min(MAX_ENTRY_TTL).as_secs().max(1)
}

#[async_trait]
impl StorageAdapter for RedisStorage {
    #[instrument(skip(self), level = "trace")]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.full_key(key)).await?;
        raw.map(|text| decode(key, &text)).transpose()
    }

    #[instrument(skip(self, value), level = "trace")]
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection.clone();
        let payload = serde_json::to_string(&value)?;
        let seconds = ttl_seconds(ttl.unwrap_or(self.default_ttl));
        let _: () = conn.set_ex(self.full_key(key), payload, seconds).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(self.full_key(key)).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self), level = "trace")]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Value>> {
        let keys = self.scan_keys(prefix).await?;
        let mut conn = self.connection.clone();

        let mut values = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(MGET_BATCH) {
            let raws: Vec<Option<String>> = redis::cmd("MGET")
                .arg(chunk)
                .query_async(&mut conn)
                .await?;
            values.extend(decode_batch(chunk, raws));
        }
        Ok(values)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
