//! Server-side platform SDK with guest identity resolution.
//!
//! Anonymous callers are identified by IP and an optional browser
//! fingerprint, cached as [`GuestRecord`]s in a pluggable [`StorageAdapter`],
//! and given chat sessions on the remote platform scoped to their guest
//! namespace.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use guest_sdk::{CacheStorage, GuestConfig, GuestResolver};
//!
//! let resolver = GuestResolver::new(GuestConfig::new(Arc::new(CacheStorage::new())));
//! let guest = resolver
//!     .resolve_or_create("1.2.3.4", Some("fp_abc"), None)
//!     .await?;
//! assert_eq!(guest.masked_ip, "1.2.xxx.xxx");
//! ```
//!
//! # Features
//!
//! - `redis`: [`RedisStorage`] for multi-instance deployments
//! - `server`: axum admin server ([`server`])
//! - `cli`: the `guest-admin` binary ([`cli`])

pub mod error;
pub mod guest;
pub mod session;
pub mod settings;
pub mod storage;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{GuestError, Result};
pub use guest::{
    derive_guest_id, mask_ip, Clock, GuestConfig, GuestCreatedHook, GuestLifecycle, GuestRecord,
    GuestResolver, GuestSummary, GuestUpdate, ManualClock, SystemClock,
};
pub use session::{GuestSession, GuestSessions, NewGuestSession, SessionApi};
pub use storage::{build_storage, CacheStats, CacheStorage, MemoryStorage, StorageAdapter, StorageBackend};

#[cfg(feature = "redis")]
pub use storage::RedisStorage;

pub use platform_client;
