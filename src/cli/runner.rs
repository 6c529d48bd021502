//! Subcommand execution.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};

use super::args::Command;
use super::bootstrap::AdminContext;
use super::output::{write_guest, write_guests, write_sweep};
use crate::server::{start_server, AdminState};

/// Run the subcommand selected in `ctx.args`.
pub async fn run(ctx: AdminContext) -> Result<()> {
    let json = ctx.args.json;

    match ctx.args.command.clone() {
        Command::Serve {
            port,
            sweep_interval,
        } => serve(ctx, port, sweep_interval).await,
        Command::List => {
            let guests = ctx.resolver.lifecycle().list_all().await?;
            write_guests(&mut io::stdout().lock(), &guests, json)
        }
        Command::Show { id } => {
            let guest = ctx
                .resolver
                .get(&id)
                .await?
                .with_context(|| format!("Guest '{}' not found", id))?;
            write_guest(&mut io::stdout().lock(), &guest, json)
        }
        Command::Sweep => {
            let removed = ctx.resolver.lifecycle().sweep_expired().await?;
            write_sweep(&mut io::stdout().lock(), removed, json)
        }
        Command::Lookup { ip, fingerprint } => {
            match ctx.resolver.lookup(&ip, fingerprint.as_deref()).await? {
                Some(guest) => write_guest(&mut io::stdout().lock(), &guest, json),
                None => anyhow::bail!("No guest found for {}", ip),
            }
        }
    }
}

/// Run the admin server until Ctrl-C.
async fn serve(ctx: AdminContext, port: Option<u16>, sweep_interval: Option<u64>) -> Result<()> {
    let port = port.unwrap_or(ctx.settings.server.port);
    let sweep_interval =
        Duration::from_secs(sweep_interval.unwrap_or(ctx.settings.server.sweep_interval_secs));

    if ctx.sessions.is_none() {
        tracing::warn!("Platform API not configured; POST /guest-sessions will return 503");
    }

    let (state, _) = AdminState::new(ctx.resolver, ctx.sessions);
    let (addr, shutdown) = start_server(port, state, sweep_interval).await?;
    eprintln!("guest-admin listening on http://{}", addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    shutdown.cancel();
    Ok(())
}
