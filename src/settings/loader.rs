//! Settings loading and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.guest-sdk/settings.toml` (or an explicit path)
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - First-run template generation

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use platform_client::{
    ClientConfig, DEFAULT_TIMEOUT, ENV_API_KEY, ENV_BASE_URL, ENV_PROJECT_ID,
};
use tokio::sync::RwLock;

use super::schema::{PlatformSettings, SdkSettings};

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".guest-sdk")
        .join("settings.toml")
}

/// Manages settings loading and interpolation.
pub struct SettingsManager {
    /// Cached settings (with env vars resolved)
    settings: RwLock<SdkSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Load from the global settings file, if present.
    pub async fn new() -> Result<Self> {
        Self::from_path(settings_path()).await
    }

    /// Load from a specific file. A missing file yields defaults.
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &Path) -> Result<SdkSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(SdkSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings file {:?}", path))?;

        let mut settings: SdkSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        Self::resolve_env_vars(&mut settings);

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Resolve $ENV_VAR references in string fields.
    fn resolve_env_vars(settings: &mut SdkSettings) {
        fn resolve_opt(value: &mut Option<String>) {
            if let Some(v) = value {
                if let Some(resolved) = resolve_env_ref(v) {
                    *v = resolved;
                }
            }
        }

        resolve_opt(&mut settings.redis.url);
        if let Some(resolved) = resolve_env_ref(&settings.redis.key_prefix) {
            settings.redis.key_prefix = resolved;
        }

        resolve_opt(&mut settings.platform.base_url);
        resolve_opt(&mut settings.platform.api_key);
        resolve_opt(&mut settings.platform.project_id);
    }

    /// Get the current settings (read-only).
    pub async fn get(&self) -> SdkSettings {
        self.settings.read().await.clone()
    }

    /// Check if settings file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Get the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let reference = trimmed.strip_prefix('$')?;

    let var_name = reference
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .unwrap_or(reference);

    std::env::var(var_name).ok()
}

/// Get a setting value with environment variable fallback.
///
/// Priority order:
/// 1. Settings value (if set and non-empty)
/// 2. Environment variable (first match from list)
/// 3. Default value
pub fn get_with_env_fallback(
    setting: &Option<String>,
    env_vars: &[&str],
    default: Option<String>,
) -> Option<String> {
    if let Some(v) = setting {
        if !v.is_empty() {
            return Some(v.clone());
        }
    }

    for env_var in env_vars {
        if let Ok(v) = std::env::var(env_var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }

    default
}

/// Platform client config from `[platform]`, falling back to the
/// `PLATFORM_API_*` environment variables.
///
/// Returns `None` when no base URL or API key is configured anywhere.
pub fn platform_client_config(settings: &PlatformSettings) -> Option<ClientConfig> {
    let base_url = get_with_env_fallback(&settings.base_url, &[ENV_BASE_URL], None)?;
    let api_key = get_with_env_fallback(&settings.api_key, &[ENV_API_KEY], None)?;
    let project_id =
        get_with_env_fallback(&settings.project_id, &[ENV_PROJECT_ID], None).unwrap_or_default();
    let timeout = settings
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    Some(ClientConfig::new(base_url, api_key, project_id).with_timeout(timeout))
}
