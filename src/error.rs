use platform_client::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuestError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Guest not found: {0}")]
    NotFound(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Guest creation callback failed: {0}")]
    CallbackFailure(String),

    #[error("Platform error: {0}")]
    Remote(#[from] PlatformError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for GuestError {
    fn from(err: redis::RedisError) -> Self {
        GuestError::BackendUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuestError>;
