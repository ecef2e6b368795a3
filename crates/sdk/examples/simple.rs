//! Simple Producer Example
//!
//! Puts one task on the `example` queue and waits for the worker's reply.
//!
//! # Usage
//!
//! 1. Start a worker that echoes results:
//!    ```bash
//!    RETASK__HANDLER__ECHO_REPLY=true cargo run --package retask-daemon -- example
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --example simple
//!    ```

use retask_sdk::{Queue, RedisSettings};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Retask SDK - Simple Example");
    println!("===========================\n");

    let url = std::env::var("RETASK_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".into());

    // 1. Connect
    println!("1. Connecting to {}...", url);
    let mut queue = Queue::new("example", RedisSettings::from_url(url))?;
    queue.connect().await?;
    println!("   ✓ Connected\n");

    // 2. Enqueue
    println!("2. Enqueuing a task...");
    let mut job = queue
        .enqueue(&json!({
            "user": "John Doe",
            "task": "High-five a sea otter."
        }))
        .await?;
    println!("   ✓ Task enqueued: {}", job.urn());
    println!("     - Queue length: {}\n", queue.length().await?);

    // 3. Wait for the reply
    println!("3. Waiting up to 10 seconds for a result...");
    if job.wait(Duration::from_secs(10)).await? {
        println!("   ✓ Result: {}", job.result().await?.cloned().unwrap_or_default());
    } else {
        println!("   ⚠ No result (is a worker running with echo_reply?)");
    }

    println!("\n✓ Example completed!");

    Ok(())
}
