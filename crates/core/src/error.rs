// Central Error Type for the Worker

use thiserror::Error;

/// Application-level error type
///
/// Recovery is decided by kind:
/// - `Connection` / `Protocol`: contained in the loop, trigger reconnect with backoff
/// - `Handler`: contained per task, never reaches the loop's control flow
/// - `Config` / `RetriesExhausted`: terminate `Worker::run`
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Handler error: {0}")]
    Handler(#[from] crate::domain::HandlerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gave up connecting after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_error: Box<AppError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse error classification used in log fields and recovery decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Protocol,
    Handler,
    Configuration,
    RetriesExhausted,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Handler => "handler",
            ErrorKind::Configuration => "configuration",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Connection(_) => ErrorKind::Connection,
            AppError::Protocol(_) => ErrorKind::Protocol,
            AppError::Handler(_) => ErrorKind::Handler,
            AppError::Config(_) => ErrorKind::Configuration,
            AppError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            AppError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// True when the session must be considered lost and re-established
    pub fn is_session_fault(&self) -> bool {
        matches!(self, AppError::Connection(_) | AppError::Protocol(_))
    }

    /// True when retrying cannot help (bad configuration, exhausted policy)
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::RetriesExhausted { .. })
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
