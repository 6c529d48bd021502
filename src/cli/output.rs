//! CLI output rendering - human-readable lines or JSON.

use std::io::Write;

use anyhow::Result;

use crate::guest::GuestRecord;

/// Render a list of guests.
pub fn write_guests(out: &mut impl Write, guests: &[GuestRecord], json: bool) -> Result<()> {
    if json {
        let body = serde_json::json!({ "guests": guests, "count": guests.len() });
        writeln!(out, "{}", serde_json::to_string(&body)?)?;
        return Ok(());
    }

    if guests.is_empty() {
        writeln!(out, "No guests")?;
        return Ok(());
    }
    for guest in guests {
        writeln!(
            out,
            "{}  {:<22}  last seen {}  sessions {}",
            guest.id,
            guest.masked_ip,
            guest.last_seen.to_rfc3339(),
            guest.sessions.len()
        )?;
    }
    writeln!(out, "{} guest(s)", guests.len())?;
    Ok(())
}

/// Render one guest in full.
pub fn write_guest(out: &mut impl Write, guest: &GuestRecord, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(guest)?)?;
        return Ok(());
    }

    writeln!(out, "id:          {}", guest.id)?;
    writeln!(out, "namespace:   {}", guest.namespace)?;
    writeln!(out, "masked ip:   {}", guest.masked_ip)?;
    writeln!(out, "created at:  {}", guest.created_at.to_rfc3339())?;
    writeln!(out, "last seen:   {}", guest.last_seen.to_rfc3339())?;
    if let Some(fp) = guest.fingerprint() {
        writeln!(out, "fingerprint: {}", fp)?;
    }
    let previous = guest.previous_ips();
    if !previous.is_empty() {
        writeln!(out, "previous ips: {}", previous.join(", "))?;
    }
    writeln!(out, "sessions:    {}", guest.sessions.join(", "))?;
    Ok(())
}

pub fn write_sweep(out: &mut impl Write, removed: usize, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::json!({ "removed": removed }))?;
    } else {
        writeln!(out, "Removed {} expired guest(s)", removed)?;
    }
    Ok(())
}
