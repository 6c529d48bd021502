//! The guest record and its pure helpers (id derivation, IP masking).

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Metadata key holding the raw (unmasked) IP
pub const META_IP: &str = "ip";
/// Metadata key holding the last known fingerprint
pub const META_FINGERPRINT: &str = "fingerprint";
/// Metadata key accumulating IPs the guest moved away from
pub const META_PREVIOUS_IPS: &str = "previousIps";
/// Metadata key accumulating replaced fingerprints
pub const META_PREVIOUS_FINGERPRINTS: &str = "previousFingerprints";

/// Keys owned by the resolver; caller-supplied metadata never overwrites them.
const RESERVED_METADATA_KEYS: [&str; 4] = [
    META_IP,
    META_FINGERPRINT,
    META_PREVIOUS_IPS,
    META_PREVIOUS_FINGERPRINTS,
];

/// Hex characters of the SHA-256 digest kept in a guest id
const GUEST_ID_HASH_LEN: usize = 16;

/// An anonymous caller tracked across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestRecord {
    /// `guest_<sha256(ip)[..16]>`, fixed at creation
    pub id: String,
    /// Rate-limiting key passed to the platform; equals `id`
    pub namespace: String,
    /// Creating IP with the low-order part redacted
    pub masked_ip: String,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Raw `ip`, `fingerprint` and their histories, plus caller metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Session ids minted for this guest, in creation order
    #[serde(default)]
    pub sessions: Vec<String>,
}

impl GuestRecord {
    /// Build a fresh record for a never-seen caller.
    pub fn new(
        ip: &str,
        fingerprint: Option<&str>,
        extra_metadata: Option<Map<String, Value>>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = derive_guest_id(ip);
        let mut record = Self {
            namespace: id.clone(),
            id,
            masked_ip: mask_ip(ip),
            is_guest: true,
            created_at: now,
            last_seen: now,
            metadata: Map::new(),
            sessions: Vec::new(),
        };

        if let Some(extra) = extra_metadata {
            record.merge_metadata(extra);
        }
        record
            .metadata
            .insert(META_IP.to_string(), Value::String(ip.to_string()));
        if let Some(fp) = fingerprint {
            record
                .metadata
                .insert(META_FINGERPRINT.to_string(), Value::String(fp.to_string()));
        }
        record
    }

    /// Last known raw IP.
    pub fn ip(&self) -> Option<&str> {
        self.metadata.get(META_IP).and_then(Value::as_str)
    }

    /// Last known fingerprint.
    pub fn fingerprint(&self) -> Option<&str> {
        self.metadata.get(META_FINGERPRINT).and_then(Value::as_str)
    }

    pub fn previous_ips(&self) -> Vec<&str> {
        self.history(META_PREVIOUS_IPS)
    }

    pub fn previous_fingerprints(&self) -> Vec<&str> {
        self.history(META_PREVIOUS_FINGERPRINTS)
    }

    fn history(&self, key: &str) -> Vec<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn push_history(&mut self, key: &str, value: String) {
        let entry = self
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(items) = entry {
            items.push(Value::String(value));
        }
    }

    /// Record that the guest now comes from `ip`. Returns false if unchanged.
    pub fn move_to_ip(&mut self, ip: &str) -> bool {
        let previous = self.ip().map(str::to_string);
        if previous.as_deref() == Some(ip) {
            return false;
        }
        if let Some(previous) = previous {
            self.push_history(META_PREVIOUS_IPS, previous);
        }
        self.metadata
            .insert(META_IP.to_string(), Value::String(ip.to_string()));
        self.masked_ip = mask_ip(ip);
        true
    }

    /// Record a new fingerprint. Returns false if unchanged.
    pub fn change_fingerprint(&mut self, fingerprint: &str) -> bool {
        let previous = self.fingerprint().map(str::to_string);
        if previous.as_deref() == Some(fingerprint) {
            return false;
        }
        if let Some(previous) = previous {
            self.push_history(META_PREVIOUS_FINGERPRINTS, previous);
        }
        self.metadata.insert(
            META_FINGERPRINT.to_string(),
            Value::String(fingerprint.to_string()),
        );
        true
    }

    /// Shallow-merge caller metadata, skipping resolver-owned keys.
    pub fn merge_metadata(&mut self, extra: Map<String, Value>) {
        for (key, value) in extra {
            if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
                continue;
            }
            self.metadata.insert(key, value);
        }
    }

    /// Append a session id unless already present. Returns whether it was added.
    pub fn attach_session(&mut self, session_id: &str) -> bool {
        if self.sessions.iter().any(|s| s == session_id) {
            return false;
        }
        self.sessions.push(session_id.to_string());
        true
    }

    /// Bump `last_seen`; never moves it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    pub fn summary(&self) -> GuestSummary {
        GuestSummary {
            id: self.id.clone(),
            namespace: self.namespace.clone(),
            created_at: self.created_at,
        }
    }
}

/// Patch applied by [`GuestResolver::update`](super::GuestResolver::update).
///
/// Metadata is merged key by key. `sessions` are appended to the existing
/// list; ids already present are skipped and none are ever removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestUpdate {
    pub metadata: Option<Map<String, Value>>,
    pub sessions: Option<Vec<String>>,
}

impl GuestUpdate {
    pub fn metadata(metadata: Map<String, Value>) -> Self {
        Self {
            metadata: Some(metadata),
            sessions: None,
        }
    }

    pub(crate) fn apply_to(self, record: &mut GuestRecord) {
        if let Some(metadata) = self.metadata {
            record.merge_metadata(metadata);
        }
        if let Some(sessions) = self.sessions {
            for session in sessions {
                record.attach_session(&session);
            }
        }
    }
}

/// Public guest fields returned alongside a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSummary {
    pub id: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

/// Stable guest id for an IP: `guest_` + first 16 hex chars of SHA-256.
pub fn derive_guest_id(ip: &str) -> String {
    let digest = hex::encode(Sha256::digest(ip.as_bytes()));
    format!("guest_{}", &digest[..GUEST_ID_HASH_LEN])
}

/// Redact the low-order part of an IP for storage.
///
/// IPv4 keeps two octets (`1.2.xxx.xxx`), IPv6 keeps four groups. IPv4-mapped
/// IPv6 addresses are masked as IPv4. Anything unparseable becomes `xxx`.
pub fn mask_ip(ip: &str) -> String {
    match ip.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => mask_v4(v4.octets()),
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => mask_v4(v4.octets()),
            None => {
                let s = v6.segments();
                format!(
                    "{:x}:{:x}:{:x}:{:x}:xxxx:xxxx:xxxx:xxxx",
                    s[0], s[1], s[2], s[3]
                )
            }
        },
        Err(_) => "xxx".to_string(),
    }
}

fn mask_v4(octets: [u8; 4]) -> String {
    format!("{}.{}.xxx.xxx", octets[0], octets[1])
}
