//! HTTP client for the remote agent platform.
//!
//! This crate is the thin transport underneath `guest-sdk`: it attaches the
//! static credential headers, serializes JSON bodies and turns non-2xx
//! responses into [`PlatformError::ApiError`]. Endpoint-specific wrappers are
//! expressed on top of the generic [`PlatformClient::request`].
//!
//! # Example
//!
//! ```rust,no_run
//! use platform_client::{ClientConfig, CreateSessionRequest, PlatformClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PlatformClient::new(ClientConfig::new(
//!         "https://api.example.com/v1",
//!         "pk_live_123",
//!         "proj_42",
//!     ))?;
//!
//!     let agents = client.get("agents", &[]).await?;
//!     println!("{agents}");
//!
//!     let ticket = client
//!         .create_session(&CreateSessionRequest {
//!             agent_id: "agent_1".into(),
//!             namespace: "guest_0123456789abcdef".into(),
//!             metadata: None,
//!         })
//!         .await?;
//!     println!("session {}", ticket.session_id);
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{PlatformClient, ENV_API_KEY, ENV_BASE_URL, ENV_PROJECT_ID};
pub use error::PlatformError;
pub use reqwest::Method;
pub use types::*;
