// Worker configuration and task failure policy

use super::constants::*;
use crate::application::retry::BackoffPolicy;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a task whose handler failed
///
/// Default is `Drop`: at-most-once delivery, the failure is logged and the
/// task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Drop,
    /// Push the task back onto the queue, at most `max_requeues` times
    Requeue { max_requeues: u32 },
}

impl FailurePolicy {
    pub fn requeue() -> Self {
        FailurePolicy::Requeue {
            max_requeues: DEFAULT_MAX_REQUEUES,
        }
    }
}

/// Injectable worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Upper bound for a single dequeue wait; also bounds shutdown latency
    pub poll_wait: Duration,
    pub idle_delay: Duration,
    pub backoff: BackoffPolicy,
    pub failure_policy: FailurePolicy,
    /// Handlers allowed to run at once; 1 keeps strict retrieval order
    pub max_in_flight: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_wait: DEFAULT_POLL_WAIT,
            idle_delay: DEFAULT_IDLE_DELAY,
            backoff: BackoffPolicy::default(),
            failure_policy: FailurePolicy::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_wait.is_zero() {
            return Err(AppError::Config(
                "poll_wait must be > 0 (a zero wait would block forever on some backends)"
                    .to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(AppError::Config("max_in_flight must be >= 1".to_string()));
        }
        self.backoff.validate()
    }
}
