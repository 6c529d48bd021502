//! Request and response types for the platform API.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the project identifier
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Connection settings for [`crate::PlatformClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the platform API (e.g. "https://api.example.com/v1")
    pub base_url: String,
    /// API key sent with every request
    pub api_key: String,
    /// Project identifier sent with every request
    pub project_id: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            project_id: project_id.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Agent the chat session talks to
    pub agent_id: String,
    /// Rate-limiting key (guest id for anonymous traffic, user id otherwise)
    pub namespace: String,
    /// Free-form metadata stored with the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Session minted by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTicket {
    /// Platform session identifier
    pub session_id: String,
    /// Bearer token the browser uses for the chat session
    pub token: String,
    /// Any other fields the platform returned (expiry, agent info, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Error body shapes the platform uses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message in the body.
    pub(crate) fn into_message(self) -> Option<String> {
        if let Some(message) = self.message.filter(|m| !m.is_empty()) {
            return Some(message);
        }
        match self.error? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            serde_json::Value::Object(obj) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}
