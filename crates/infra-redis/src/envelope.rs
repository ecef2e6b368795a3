// Wire envelope shared by producers and workers
//
// Queue `name` lives in the Redis list `retaskqueue-{name}`. Producers LPUSH,
// workers BRPOP, so the list behaves as a FIFO. Each element is:
//
//     {"_data": "<json text of the payload>", "urn": "urn:uuid:<v4>"}
//
// `retries` is only written once a task has been requeued.

use retask_core::domain::{QueueName, Task, TaskId};
use retask_core::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix of every queue list key
pub const QUEUE_KEY_PREFIX: &str = "retaskqueue-";

/// Redis key holding the list for `queue`
pub fn queue_key(queue: &QueueName) -> String {
    format!("{}{}", QUEUE_KEY_PREFIX, queue)
}

/// Serialized form of a task on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "_data")]
    pub data: String,

    #[serde(default)]
    pub urn: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub retries: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Envelope {
    pub fn new(data: impl Into<String>, urn: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            urn: urn.into(),
            retries: 0,
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            data: task.payload().to_string(),
            urn: task.id().map(|id| id.to_string()).unwrap_or_default(),
            retries: task.retries(),
        }
    }

    pub fn into_task(self) -> Task {
        let task = Task::new(self.data).with_retries(self.retries);
        if self.urn.is_empty() {
            task
        } else {
            task.with_id(TaskId::new(self.urn))
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Turn a raw list element into a task
///
/// Elements that are not envelopes (e.g. bare JSON pushed by another
/// producer) are delivered as-is: the whole element becomes the payload and
/// the task has no id. Whether that payload makes sense is up to the handler.
pub fn decode_task(raw: &str) -> Task {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => envelope.into_task(),
        Err(e) => {
            debug!(error = %e, "List element is not an envelope, delivering raw payload");
            Task::new(raw)
        }
    }
}
