//! SDK Error Types

use retask_core::AppError;
use thiserror::Error;

/// SDK Result type
pub type Result<T> = std::result::Result<T, SdkError>;

/// SDK Error
#[derive(Debug, Error)]
pub enum SdkError {
    #[error("Queue is not connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<AppError> for SdkError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Connection(msg) => SdkError::Connection(msg),
            AppError::Protocol(msg) => SdkError::Protocol(msg),
            AppError::Config(msg) => SdkError::Config(msg),
            AppError::Serialization(e) => SdkError::Serialization(e),
            other => SdkError::Other(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for SdkError {
    fn from(e: redis::RedisError) -> Self {
        retask_infra_redis::classify_redis_error(e, "redis").into()
    }
}
