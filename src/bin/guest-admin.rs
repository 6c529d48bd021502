//! guest-admin - inspect and maintain the guest identity cache
//!
//! # Usage
//!
//! ```bash
//! # Run the admin HTTP server
//! guest-admin serve --port 8787
//!
//! # List guests in a shared Redis store as JSON
//! guest-admin --settings ./settings.toml list --json | jq .
//!
//! # Find the guest behind an IP/fingerprint
//! guest-admin lookup 1.2.3.4 --fingerprint fp_abc
//!
//! # Remove idle guests now
//! guest-admin sweep
//! ```
//!
//! # Features
//!
//! This binary requires the `cli` feature flag.

use anyhow::Result;
use clap::Parser;

use guest_sdk::cli::{initialize, run, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let ctx = initialize(&args).await?;
    run(ctx).await
}
