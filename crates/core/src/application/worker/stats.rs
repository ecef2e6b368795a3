// Worker run statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters for one `Worker::run`, returned on a clean stop
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub connect_attempts: u64,
    pub reconnects: u64,
    pub tasks_received: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_requeued: u64,
    pub tasks_dropped: u64,
    pub replies_sent: u64,
}

impl WorkerStats {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Utc::now(),
            stopped_at: None,
            connect_attempts: 0,
            reconnects: 0,
            tasks_received: 0,
            tasks_succeeded: 0,
            tasks_failed: 0,
            tasks_requeued: 0,
            tasks_dropped: 0,
            replies_sent: 0,
        }
    }

    /// Tasks dequeued whose handler has not reported back yet
    pub fn in_flight(&self) -> u64 {
        self.tasks_received
            .saturating_sub(self.tasks_succeeded + self.tasks_failed)
    }
}
