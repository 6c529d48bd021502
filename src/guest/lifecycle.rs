use std::sync::Arc;

use super::record::GuestRecord;
use super::resolver::GuestConfig;
use super::{guest_key, GUEST_KEY_PREFIX};
use crate::error::Result;

/// Enumerates and expires guest records.
///
/// Nothing here runs on its own; callers (or the admin server) decide when
/// to sweep.
#[derive(Debug, Clone)]
pub struct GuestLifecycle {
    config: Arc<GuestConfig>,
}

impl GuestLifecycle {
    pub fn new(config: Arc<GuestConfig>) -> Self {
        Self { config }
    }

    /// Every live guest record. Values that fail to decode are skipped.
    pub async fn list_all(&self) -> Result<Vec<GuestRecord>> {
        let values = self.config.storage.scan_prefix(GUEST_KEY_PREFIX).await?;
        let total = values.len();

        let records: Vec<GuestRecord> = values
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable guest record");
                    None
                }
            })
            .collect();

        tracing::debug!(total, decoded = records.len(), "Listed guests");
        Ok(records)
    }

    /// Delete every record idle for longer than the TTL. Returns how many
    /// were removed. Index entries are left to expire on their own.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.config.clock.now();

        let mut removed = 0;
        for record in self.list_all().await? {
            // A last_seen in the future (clock skew) is never idle.
            let idle = (now - record.last_seen).to_std().unwrap_or_default();
            if idle <= self.config.ttl {
                continue;
            }
            if self.config.storage.delete(&guest_key(&record.id)).await? {
                tracing::debug!(guest_id = %record.id, last_seen = %record.last_seen, "Expired guest");
                removed += 1;
            }
        }

        tracing::info!(removed, backend = self.config.storage.backend_name(), "Guest sweep finished");
        Ok(removed)
    }
}
