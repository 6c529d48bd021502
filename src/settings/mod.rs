//! TOML-based settings for the guest SDK.
//!
//! Settings are loaded from `~/.guest-sdk/settings.toml` with environment
//! variable interpolation support. Secrets may also come straight from the
//! environment through the `get_with_env_fallback` helper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use guest_sdk::settings::{SettingsManager, platform_client_config};
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let storage = guest_sdk::storage::build_storage(&settings).await?;
//! let platform = platform_client_config(&settings.platform);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_with_env_fallback, platform_client_config, settings_path, SettingsManager};
pub use schema::{
    AdvancedSettings, GuestSettings, PlatformSettings, RedisSettings, SdkSettings, ServerSettings,
};
