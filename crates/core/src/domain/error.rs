// Domain Error Types

use thiserror::Error;

/// Task-level processing failure
///
/// Always recovered inside the worker: the task is dropped or requeued,
/// polling continues with the next task.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        HandlerError::Failed(msg.into())
    }
}
