//! Settings schema definitions for the guest SDK.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::guest::DEFAULT_TTL_SECS;
use crate::storage::cache::DEFAULT_CACHE_MAX_ENTRIES;
use crate::storage::StorageBackend;

/// Root settings structure.
///
/// Loaded from `~/.guest-sdk/settings.toml` with environment variable interpolation support.
/// Version field enables future migrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Guest identity cache
    pub guest: GuestSettings,

    /// Redis connection (used when `guest.backend = "redis"`)
    pub redis: RedisSettings,

    /// Remote platform API
    pub platform: PlatformSettings,

    /// Admin HTTP server
    pub server: ServerSettings,

    /// Advanced/debug settings
    pub advanced: AdvancedSettings,
}

/// Guest identity cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuestSettings {
    /// TTL for records and indexes, in seconds
    pub ttl_secs: u64,

    /// Storage backend: "memory" | "cache" | "redis"
    pub backend: StorageBackend,

    /// Capacity of the "cache" backend
    pub cache_max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RedisSettings {
    /// Connection URL, e.g. "redis://127.0.0.1:6379/0"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Prepended to every key
    pub key_prefix: String,
}

/// Remote platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PlatformSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Per-request timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen port (0 picks a free port)
    pub port: u16,

    /// Seconds between automatic sweeps; 0 disables them
    pub sweep_interval_secs: u64,
}

/// Advanced settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Log level: "error" | "warn" | "info" | "debug" | "trace"
    pub log_level: String,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            version: 1,
            guest: GuestSettings::default(),
            redis: RedisSettings::default(),
            platform: PlatformSettings::default(),
            server: ServerSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

impl Default for GuestSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            backend: StorageBackend::default(),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8787,
            sweep_interval_secs: 3600,
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
