// Port Layer - Interfaces for external collaborators

pub mod queue_client;
pub mod task_handler;

// Re-exports
pub use queue_client::QueueClient;
pub use task_handler::{handler_fn, FnHandler, HandlerOutcome, TaskHandler};
