//! Retask SDK - Producer Library
//!
//! Puts tasks on Retask queues and collects the results workers send back.
//!
//! # Example
//!
//! ```no_run
//! use retask_sdk::{Queue, RedisSettings};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut queue = Queue::new("example", RedisSettings::default())?;
//!     queue.connect().await?;
//!
//!     let mut job = queue
//!         .enqueue(&json!({"user": "John Doe", "task": "High-five a sea otter."}))
//!         .await?;
//!
//!     println!("Job enqueued: {}", job.urn());
//!
//!     if job.wait(Duration::from_secs(10)).await? {
//!         println!("Result: {:?}", job.result().await?);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod error;
mod job;
mod queue;

pub use error::{Result, SdkError};
pub use job::Job;
pub use queue::Queue;
pub use retask_core::domain::{QueueName, Task, TaskId};
pub use retask_infra_redis::RedisSettings;
