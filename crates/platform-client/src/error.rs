//! Error types for the platform API client.

use thiserror::Error;

/// Errors that can occur when calling the remote platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl PlatformError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            PlatformError::ApiError { status, .. } => Some(*status),
            PlatformError::HttpError(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::ParseError(err.to_string())
    }
}

impl From<url::ParseError> for PlatformError {
    fn from(err: url::ParseError) -> Self {
        PlatformError::ConfigError(format!("invalid URL: {}", err))
    }
}
