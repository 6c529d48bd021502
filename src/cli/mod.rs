//! Admin CLI for the guest identity cache.
//!
//! ```text
//! +-------------+     +--------------+     +-------------+
//! | args.rs     | --> | bootstrap.rs | --> | runner.rs   |
//! | (clap)      |     | (settings,   |     | (subcommand |
//! |             |     |  storage)    |     |  + output)  |
//! +-------------+     +--------------+     +-------------+
//! ```
//!
//! Listing and sweeping are most useful against the Redis backend, where
//! state is shared with the running services. Against the in-process
//! backends the CLI only sees its own (empty) store, so `serve` is the
//! interesting subcommand there.

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::{Args, Command};
pub use bootstrap::{initialize, AdminContext};
pub use runner::run;
