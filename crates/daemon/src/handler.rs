//! Built-in task handler for the worker binary

use async_trait::async_trait;
use retask_core::domain::Task;
use retask_core::port::{HandlerOutcome, TaskHandler};
use tracing::info;

/// Prints each task's decoded payload, optionally echoing it back as the result
pub struct PrintHandler {
    echo_reply: bool,
}

impl PrintHandler {
    pub fn new(echo_reply: bool) -> Self {
        Self { echo_reply }
    }
}

#[async_trait]
impl TaskHandler for PrintHandler {
    async fn handle(&self, task: &Task) -> HandlerOutcome {
        let data = task.data()?;
        info!(task_id = %task.log_id(), retries = task.retries(), "Task received");
        println!("{}", data);

        Ok(self.echo_reply.then_some(data))
    }
}
