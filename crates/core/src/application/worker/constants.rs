// Worker constants (no magic values in the loop)
use std::time::Duration;

/// How long a single dequeue may wait for a task (1s)
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(1);

/// Pause after an empty dequeue before polling again (100ms)
/// Guards against a tight spin when the backend's own wait window is near zero
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(100);

/// First connect retry delay (1s)
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound for any connect retry delay (30s)
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// ±10% jitter on connect retry delays to avoid reconnect stampedes
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.1;

/// Sequential handling by default: one task in flight, retrieval order preserved
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// Requeue budget per task when the requeue failure policy is selected
pub const DEFAULT_MAX_REQUEUES: u32 = 3;
