//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for guest-admin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Guest admin - inspect and maintain the guest identity cache
#[derive(Parser, Debug, Clone)]
#[command(name = "guest-admin")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: ~/.guest-sdk/settings.toml)
    #[arg(short = 's', long, global = true, env = "GUEST_SDK_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Output as JSON (for scripting/parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the admin HTTP server
    Serve {
        /// Port to listen on (overrides settings)
        #[arg(short = 'p', long)]
        port: Option<u16>,

        /// Seconds between background sweeps; 0 disables (overrides settings)
        #[arg(long)]
        sweep_interval: Option<u64>,
    },

    /// List every live guest
    List,

    /// Show one guest by id
    Show {
        /// Guest id (guest_...)
        id: String,
    },

    /// Delete guests idle for longer than the TTL
    Sweep,

    /// Resolve an IP/fingerprint to a guest without creating one
    Lookup {
        ip: String,

        #[arg(short = 'f', long)]
        fingerprint: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["guest-admin", "list"]);
        assert_eq!(args.command, Command::List);
        assert!(args.settings.is_none());
        assert!(!args.json);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_serve_overrides() {
        let args = Args::parse_from(["guest-admin", "serve", "-p", "9000", "--sweep-interval", "0"]);
        assert_eq!(
            args.command,
            Command::Serve {
                port: Some(9000),
                sweep_interval: Some(0),
            }
        );
    }

    #[test]
    fn test_args_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "guest-admin",
            "show",
            "guest_0123456789abcdef",
            "--json",
            "--settings",
            "/tmp/settings.toml",
        ]);
        assert!(args.json);
        assert_eq!(args.settings, Some(PathBuf::from("/tmp/settings.toml")));
        assert_eq!(
            args.command,
            Command::Show {
                id: "guest_0123456789abcdef".into()
            }
        );
    }

    #[test]
    fn test_args_lookup_fingerprint() {
        let args = Args::parse_from(["guest-admin", "lookup", "1.2.3.4", "-f", "fp_abc"]);
        assert_eq!(
            args.command,
            Command::Lookup {
                ip: "1.2.3.4".into(),
                fingerprint: Some("fp_abc".into()),
            }
        );
    }

    #[test]
    fn test_args_subcommand_required() {
        assert!(Args::try_parse_from(["guest-admin"]).is_err());
    }
}
