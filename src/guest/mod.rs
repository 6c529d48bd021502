//! Guest identity resolution and caching.
//!
//! Anonymous callers are tracked by two signals: the remote IP and an optional
//! browser fingerprint. Each guest is one [`GuestRecord`] stored under
//! `guest:<id>`, with two secondary indexes pointing at it:
//!
//! ```text
//! fp:<fingerprint> ──┐
//!                    ├──> guest:<id>  (GuestRecord JSON)
//! ip:<ip>        ────┘
//! ```
//!
//! The record and both indexes share one TTL. Indexes are best-effort: a
//! stale index pointing at a missing record is a cache miss, never an error.
//! The fingerprint is the stronger signal and wins when the two indexes
//! disagree.

mod clock;
mod lifecycle;
mod record;
mod resolver;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lifecycle::GuestLifecycle;
pub use record::{derive_guest_id, mask_ip, GuestRecord, GuestSummary, GuestUpdate};
pub use resolver::{GuestConfig, GuestCreatedHook, GuestResolver};

/// Default guest TTL: one day
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

/// Storage key prefix for guest records
pub const GUEST_KEY_PREFIX: &str = "guest:";

/// Storage key prefix for the fingerprint index
pub const FINGERPRINT_KEY_PREFIX: &str = "fp:";

/// Storage key prefix for the IP index
pub const IP_KEY_PREFIX: &str = "ip:";

pub(crate) fn guest_key(id: &str) -> String {
    format!("{}{}", GUEST_KEY_PREFIX, id)
}

pub(crate) fn fingerprint_key(fingerprint: &str) -> String {
    format!("{}{}", FINGERPRINT_KEY_PREFIX, fingerprint)
}

pub(crate) fn ip_key(ip: &str) -> String {
    format!("{}{}", IP_KEY_PREFIX, ip)
}
