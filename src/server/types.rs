//! Request/Response types for the admin HTTP server.
//!
//! These types define the wire format for all HTTP API endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::guest::GuestRecord;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Server status (always "ok" when healthy)
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
    /// Storage backend in use
    pub backend: String,
}

impl HealthResponse {
    /// Create a healthy response with the current package version
    pub fn healthy(backend: &str) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            backend: backend.to_string(),
        }
    }
}

/// Response listing all guests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListGuestsResponse {
    pub guests: Vec<GuestRecord>,
    pub count: usize,
}

/// Result of a sweep
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepResponse {
    pub removed: usize,
}

/// Request to create a guest chat session.
///
/// `ip` is optional here; the server falls back to `x-forwarded-for` and
/// then the peer address.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateGuestSessionRequest {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    pub agent_id: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code for programmatic handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with a message and code
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(code.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod health_response_tests {
        use super::*;

        #[test]
        fn healthy_returns_ok_status() {
            let resp = HealthResponse::healthy("cache");
            assert_eq!(resp.status, "ok");
            assert_eq!(resp.backend, "cache");
        }

        #[test]
        fn healthy_includes_version() {
            let resp = HealthResponse::healthy("memory");
            assert_eq!(resp.version, env!("CARGO_PKG_VERSION"));
        }
    }

    mod create_guest_session_request_tests {
        use super::*;

        #[test]
        fn deserializes_with_only_agent_id() {
            let req: CreateGuestSessionRequest =
                serde_json::from_str(r#"{"agentId":"agent_1"}"#).unwrap();
            assert_eq!(req.agent_id, "agent_1");
            assert!(req.ip.is_none());
            assert!(req.fingerprint.is_none());
        }

        #[test]
        fn missing_agent_id_is_rejected() {
            assert!(serde_json::from_str::<CreateGuestSessionRequest>(r#"{"ip":"1.2.3.4"}"#).is_err());
        }
    }

    mod error_response_tests {
        use super::*;

        #[test]
        fn code_is_omitted_when_none() {
            let err = ErrorResponse {
                error: "boom".to_string(),
                code: None,
            };
            let json = serde_json::to_string(&err).unwrap();
            assert!(!json.contains("code"));
        }

        #[test]
        fn with_code_serializes_code() {
            let json = serde_json::to_string(&ErrorResponse::with_code("gone", "NOT_FOUND")).unwrap();
            assert!(json.contains("\"code\":\"NOT_FOUND\""));
        }
    }
}
