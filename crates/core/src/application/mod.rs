// Application Layer - The consumption loop and its policies

pub mod retry;
pub mod worker;

// Re-exports
pub use retry::{BackoffPolicy, RetryDecision};
pub use worker::{
    shutdown_channel, FailurePolicy, ShutdownSender, ShutdownToken, Worker, WorkerConfig,
    WorkerStats,
};
