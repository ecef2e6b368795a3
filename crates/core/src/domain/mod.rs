// Domain Layer - Pure types shared by the worker and its adapters

pub mod error;
pub mod queue;
pub mod state;
pub mod task;

// Re-exports
pub use error::HandlerError;
pub use queue::{QueueName, MAX_QUEUE_NAME_LEN};
pub use state::WorkerState;
pub use task::{Task, TaskId};
