// Worker lifecycle state

use serde::{Deserialize, Serialize};

/// Worker lifecycle
///
/// `Idle -> Running` on successful connect, `Running -> Idle` on session loss,
/// `* -> Stopped` on shutdown or an unrecoverable error. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopped)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "IDLE"),
            WorkerState::Running => write!(f, "RUNNING"),
            WorkerState::Stopped => write!(f, "STOPPED"),
        }
    }
}
