// Task Domain Model

use crate::domain::HandlerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Task identifier (a `urn:uuid:...` string for Redis producers)
///
/// Used to route results back to the producer and to correlate log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work retrieved from the queue
///
/// Immutable once dequeued. The payload is kept as the raw text the producer
/// stored; interpreting it is the handler's job (see [`Task::data`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: Option<TaskId>,
    payload: String,
    retries: u32,
}

impl Task {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: payload.into(),
            retries: 0,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn id(&self) -> Option<&TaskId> {
        self.id.as_ref()
    }

    /// Raw payload text, uninterpreted
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Number of times this task has been put back on the queue after a failure
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Decode the payload as JSON
    ///
    /// A payload that fails to decode is a handler-level failure, never a
    /// connection problem.
    pub fn data(&self) -> Result<serde_json::Value, HandlerError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Decode the payload into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Copy of this task to be put back on the queue, with the retry counter bumped
    pub fn for_retry(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: self.payload.clone(),
            retries: self.retries.saturating_add(1),
        }
    }

    /// Short identifier for log fields
    pub fn log_id(&self) -> &str {
        self.id.as_ref().map(TaskId::as_str).unwrap_or("-")
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({}, {})", self.log_id(), self.payload)
    }
}
