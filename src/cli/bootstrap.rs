//! CLI bootstrap - load settings, set up logging and build the guest stack.

use std::sync::Arc;

use anyhow::{Context, Result};
use platform_client::PlatformClient;

use crate::guest::{GuestConfig, GuestResolver};
use crate::session::GuestSessions;
use crate::settings::{platform_client_config, SdkSettings, SettingsManager};
use crate::storage::build_storage;

use super::args::Args;

/// Everything a subcommand needs.
pub struct AdminContext {
    pub settings: SdkSettings,
    pub resolver: GuestResolver,
    /// Present when the platform API is configured
    pub sessions: Option<GuestSessions>,
    pub args: Args,
}

/// Initialize settings, logging, storage and (when configured) the platform client.
pub async fn initialize(args: &Args) -> Result<AdminContext> {
    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        // Only warn on errors other than file not found
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Failed to load .env file: {}", e);
        }
    }

    let settings_manager = match &args.settings {
        Some(path) => SettingsManager::from_path(path).await,
        None => SettingsManager::new().await,
    }
    .context("Failed to load settings")?;

    let settings = settings_manager.get().await;
    init_logging(&settings, args.verbose)?;

    // Only the default location gets a first-run template
    if args.settings.is_none() {
        if let Err(e) = settings_manager.ensure_settings_file().await {
            tracing::warn!("Failed to create settings template: {}", e);
        }
    }

    if args.verbose {
        eprintln!(
            "[cli] Settings loaded from {}",
            settings_manager.path().display()
        );
        eprintln!("[cli] Storage backend: {}", settings.guest.backend);
    }

    let storage = build_storage(&settings)
        .await
        .context("Failed to initialize guest storage")?;
    let resolver = GuestResolver::new(GuestConfig::from_settings(storage, &settings.guest));

    let sessions = match platform_client_config(&settings.platform) {
        Some(config) => {
            let client = PlatformClient::new(config).context("Invalid platform configuration")?;
            if args.verbose {
                eprintln!("[cli] Platform API: {}", client.base_url());
            }
            Some(GuestSessions::new(resolver.clone(), Arc::new(client)))
        }
        None => {
            tracing::debug!("Platform API not configured; guest sessions disabled");
            None
        }
    };

    Ok(AdminContext {
        settings,
        resolver,
        sessions,
        args: args.clone(),
    })
}

/// Install the tracing subscriber. `RUST_LOG` wins over settings.
fn init_logging(settings: &SdkSettings, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        settings.advanced.log_level.as_str()
    };

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(format!(
            "guest_sdk={0},platform_client={0}",
            level
        ))
        .with_context(|| format!("Invalid log level '{}'", level))?,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}
