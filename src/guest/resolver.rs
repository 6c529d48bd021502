use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::instrument;

use super::clock::{Clock, SystemClock};
use super::lifecycle::GuestLifecycle;
use super::record::{derive_guest_id, GuestRecord, GuestUpdate};
use super::{fingerprint_key, guest_key, ip_key, DEFAULT_TTL_SECS};
use crate::error::{GuestError, Result};
use crate::settings::GuestSettings;
use crate::storage::StorageAdapter;

/// Notified once for every newly created guest.
///
/// Runs in a detached task after the record is persisted. Failures and
/// panics are logged and never reach the resolving caller.
#[async_trait]
pub trait GuestCreatedHook: Send + Sync {
    async fn on_guest_created(&self, guest: &GuestRecord) -> anyhow::Result<()>;
}

/// Shared configuration for the resolver and lifecycle manager.
#[derive(Clone)]
pub struct GuestConfig {
    pub storage: Arc<dyn StorageAdapter>,
    /// TTL applied to records and both indexes on every write
    pub ttl: Duration,
    pub on_created: Option<Arc<dyn GuestCreatedHook>>,
    pub clock: Arc<dyn Clock>,
}

impl GuestConfig {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            on_created: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Config using the TTL from `[guest]` settings.
    pub fn from_settings(storage: Arc<dyn StorageAdapter>, settings: &GuestSettings) -> Self {
        Self::new(storage).with_ttl(Duration::from_secs(settings.ttl_secs))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn GuestCreatedHook>) -> Self {
        self.on_created = Some(hook);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for GuestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestConfig")
            .field("backend", &self.storage.backend_name())
            .field("ttl", &self.ttl)
            .field("on_created", &self.on_created.is_some())
            .finish()
    }
}

/// Which signal located an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matched {
    Fingerprint,
    Ip,
}

/// Finds or creates guest identities from (IP, fingerprint) pairs.
#[derive(Debug, Clone)]
pub struct GuestResolver {
    config: Arc<GuestConfig>,
}

impl GuestResolver {
    pub fn new(config: GuestConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GuestConfig {
        &self.config
    }

    /// Lifecycle manager sharing this resolver's storage, TTL and clock.
    pub fn lifecycle(&self) -> GuestLifecycle {
        GuestLifecycle::new(self.config.clone())
    }

    /// Resolve the guest behind `ip` / `fingerprint`, creating it if unseen.
    ///
    /// The fingerprint index is consulted first, then the IP index, then the
    /// record under the IP-derived id. A located record always follows the
    /// caller to `ip`; an IP match also picks up a new fingerprint.
    /// `extra_metadata` is merged into the record on every call.
    #[instrument(skip(self, extra_metadata))]
    pub async fn resolve_or_create(
        &self,
        ip: &str,
        fingerprint: Option<&str>,
        extra_metadata: Option<Map<String, Value>>,
    ) -> Result<GuestRecord> {
        let ip = normalize_ip(ip)?;
        let fingerprint = normalize_fingerprint(fingerprint);
        let now = self.config.clock.now();

        let Some((mut record, matched)) = self.find(ip, fingerprint).await? else {
            return self.create(ip, fingerprint, extra_metadata).await;
        };

        match matched {
            Matched::Fingerprint => {
                if record.move_to_ip(ip) {
                    tracing::debug!(guest_id = %record.id, "Guest moved to a new IP");
                }
            }
            Matched::Ip => {
                // The index may predate a move to another IP
                if record.move_to_ip(ip) {
                    tracing::debug!(guest_id = %record.id, "Guest returned to an indexed IP");
                }
                if let Some(fp) = fingerprint {
                    if record.change_fingerprint(fp) {
                        tracing::debug!(guest_id = %record.id, "Guest fingerprint changed");
                    }
                }
            }
        }
        record.touch(now);
        if let Some(extra) = extra_metadata {
            record.merge_metadata(extra);
        }

        self.persist(&record, ip, fingerprint).await?;
        Ok(record)
    }

    /// Resolve with a single metadata map; `fingerprint` is read from it.
    pub async fn resolve_or_create_with_metadata(
        &self,
        ip: &str,
        metadata: Map<String, Value>,
    ) -> Result<GuestRecord> {
        let fingerprint = metadata
            .get("fingerprint")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.resolve_or_create(ip, fingerprint.as_deref(), Some(metadata))
            .await
    }

    /// Read-only resolution. Never creates or mutates anything.
    pub async fn lookup(&self, ip: &str, fingerprint: Option<&str>) -> Result<Option<GuestRecord>> {
        let ip = normalize_ip(ip)?;
        let fingerprint = normalize_fingerprint(fingerprint);
        Ok(self.find(ip, fingerprint).await?.map(|(record, _)| record))
    }

    /// Fetch a record by guest id.
    pub async fn get(&self, guest_id: &str) -> Result<Option<GuestRecord>> {
        self.load(guest_id).await
    }

    /// Link a session id to a guest. Attaching the same id twice is a no-op
    /// apart from the `last_seen` bump.
    #[instrument(skip(self))]
    pub async fn attach_session(&self, guest_id: &str, session_id: &str) -> Result<GuestRecord> {
        if session_id.trim().is_empty() {
            return Err(GuestError::InvalidArgument(
                "session id must not be empty".into(),
            ));
        }
        let mut record = self.require(guest_id).await?;
        record.attach_session(session_id);
        record.touch(self.config.clock.now());
        self.save(&record).await?;
        Ok(record)
    }

    /// Apply a metadata/sessions patch to an existing guest.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, guest_id: &str, patch: GuestUpdate) -> Result<GuestRecord> {
        let mut record = self.require(guest_id).await?;
        patch.apply_to(&mut record);
        record.touch(self.config.clock.now());
        self.save(&record).await?;
        Ok(record)
    }

    /// Delete a guest and any index entries still pointing at it.
    #[instrument(skip(self))]
    pub async fn remove(&self, guest_id: &str) -> Result<bool> {
        let storage = &self.config.storage;
        if let Some(record) = self.load(guest_id).await? {
            let mut index_keys = Vec::new();
            if let Some(ip) = record.ip() {
                index_keys.push(ip_key(ip));
            }
            if let Some(fp) = record.fingerprint() {
                index_keys.push(fingerprint_key(fp));
            }
            for key in index_keys {
                if storage.get(&key).await?.as_ref().and_then(Value::as_str) == Some(guest_id) {
                    storage.delete(&key).await?;
                }
            }
        }

        let removed = storage.delete(&guest_key(guest_id)).await?;
        if removed {
            tracing::info!(guest_id, "Removed guest");
        }
        Ok(removed)
    }

    async fn find(
        &self,
        ip: &str,
        fingerprint: Option<&str>,
    ) -> Result<Option<(GuestRecord, Matched)>> {
        if let Some(fp) = fingerprint {
            if let Some(record) = self.load_indexed(&fingerprint_key(fp)).await? {
                return Ok(Some((record, Matched::Fingerprint)));
            }
        }
        if let Some(record) = self.load_indexed(&ip_key(ip)).await? {
            return Ok(Some((record, Matched::Ip)));
        }
        // Indexes may expire or be lost while the record survives.
        let record = self.load(&derive_guest_id(ip)).await?;
        if record.is_some() {
            tracing::debug!(ip, "Recovered guest from IP-derived id");
        }
        Ok(record.map(|record| (record, Matched::Ip)))
    }

    async fn create(
        &self,
        ip: &str,
        fingerprint: Option<&str>,
        extra_metadata: Option<Map<String, Value>>,
    ) -> Result<GuestRecord> {
        let record = GuestRecord::new(ip, fingerprint, extra_metadata, self.config.clock.now());
        self.persist(&record, ip, fingerprint).await?;
        tracing::info!(guest_id = %record.id, masked_ip = %record.masked_ip, "Created guest");

        if let Some(hook) = &self.config.on_created {
            spawn_created_hook(hook.clone(), record.clone());
        }
        Ok(record)
    }

    async fn require(&self, guest_id: &str) -> Result<GuestRecord> {
        self.load(guest_id)
            .await?
            .ok_or_else(|| GuestError::NotFound(guest_id.to_string()))
    }

    /// Record stored under `guest:<id>`. Undecodable values count as missing.
    async fn load(&self, guest_id: &str) -> Result<Option<GuestRecord>> {
        let Some(value) = self.config.storage.get(&guest_key(guest_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(guest_id, error = %e, "Ignoring undecodable guest record");
                Ok(None)
            }
        }
    }

    /// Follow an index entry to its record. Stale pointers are misses.
    async fn load_indexed(&self, index_key: &str) -> Result<Option<GuestRecord>> {
        let Some(pointer) = self.config.storage.get(index_key).await? else {
            return Ok(None);
        };
        let Some(guest_id) = pointer.as_str() else {
            tracing::debug!(index_key, "Index entry is not a guest id");
            return Ok(None);
        };
        let record = self.load(guest_id).await?;
        if record.is_none() {
            tracing::debug!(index_key, guest_id, "Stale index entry");
        }
        Ok(record)
    }

    async fn save(&self, record: &GuestRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.config
            .storage
            .set(&guest_key(&record.id), value, Some(self.config.ttl))
            .await
    }

    async fn write_index(&self, index_key: String, guest_id: &str) -> Result<()> {
        self.config
            .storage
            .set(
                &index_key,
                Value::String(guest_id.to_string()),
                Some(self.config.ttl),
            )
            .await
    }

    /// Save the record and point both indexes at it, refreshing every TTL.
    async fn persist(&self, record: &GuestRecord, ip: &str, fingerprint: Option<&str>) -> Result<()> {
        let fingerprint_index = async {
            match fingerprint {
                Some(fp) => self.write_index(fingerprint_key(fp), &record.id).await,
                None => Ok(()),
            }
        };
        tokio::try_join!(
            self.save(record),
            self.write_index(ip_key(ip), &record.id),
            fingerprint_index,
        )?;
        Ok(())
    }
}

fn normalize_ip(ip: &str) -> Result<&str> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(GuestError::InvalidArgument("ip must not be empty".into()));
    }
    Ok(ip)
}

fn normalize_fingerprint(fingerprint: Option<&str>) -> Option<&str> {
    fingerprint.map(str::trim).filter(|fp| !fp.is_empty())
}

fn spawn_created_hook(hook: Arc<dyn GuestCreatedHook>, record: GuestRecord) {
    let guest_id = record.id.clone();
    tokio::spawn(async move {
        let outcome = tokio::spawn(async move { hook.on_guest_created(&record).await }).await;
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => GuestError::CallbackFailure(format!("{:#}", e)),
            Err(join) => GuestError::CallbackFailure(format!("hook task aborted: {}", join)),
        };
        tracing::warn!(guest_id = %guest_id, error = %failure, "Guest creation hook failed");
    });
}
