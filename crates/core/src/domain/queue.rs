// Queue Domain Model

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Maximum accepted queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Logical queue identity
///
/// Validated once at construction and immutable afterwards; a worker binds to
/// exactly one `QueueName` for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Validate and wrap a queue name
    ///
    /// # Errors
    /// `AppError::Config` if the name is empty, longer than
    /// `MAX_QUEUE_NAME_LEN`, or contains characters other than ASCII
    /// alphanumerics, `_`, `-`, `.` and `:`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(AppError::Config("queue name cannot be empty".to_string()));
        }

        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(AppError::Config(format!(
                "queue name too long ({} > {} chars)",
                name.len(),
                MAX_QUEUE_NAME_LEN
            )));
        }

        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        {
            return Err(AppError::Config(format!(
                "queue name must be alphanumeric (plus _ - . :), found {:?} in {:?}",
                bad, name
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for QueueName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(value: QueueName) -> Self {
        value.0
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
