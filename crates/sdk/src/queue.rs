//! Producer-side queue handle

use crate::error::{Result, SdkError};
use crate::job::Job;
use redis::aio::MultiplexedConnection;
use retask_core::domain::{QueueName, Task};
use retask_infra_redis::{open_connection, queue_key, Envelope, RedisSettings, QUEUE_KEY_PREFIX};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const SCAN_BATCH: usize = 100;

/// Named Retask queue
///
/// # Example
///
/// ```no_run
/// use retask_sdk::{Queue, RedisSettings};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut queue = Queue::new("example", RedisSettings::default())?;
/// queue.connect().await?;
///
/// let mut job = queue.enqueue(&json!({"user": "John Doe"})).await?;
/// if job.wait(Duration::from_secs(5)).await? {
///     println!("result: {:?}", job.result().await?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Queue {
    name: QueueName,
    key: String,
    settings: RedisSettings,
    conn: Option<MultiplexedConnection>,
}

impl Queue {
    /// Describe a queue; nothing is opened until [`Queue::connect`]
    pub fn new(name: impl Into<String>, settings: RedisSettings) -> Result<Self> {
        let name = QueueName::new(name)?;
        Ok(Self {
            key: queue_key(&name),
            name,
            settings,
            conn: None,
        })
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    /// Open the Redis session
    pub async fn connect(&mut self) -> Result<()> {
        let conn = open_connection(&self.settings).await?;
        info!(queue = %self.name, url = %self.settings.display_url(), "Queue connected");
        self.conn = Some(conn);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Handle on another queue, sharing this one's connection
    pub fn with_name(&self, name: impl Into<String>) -> Result<Queue> {
        let name = QueueName::new(name)?;
        Ok(Queue {
            key: queue_key(&name),
            name,
            settings: self.settings.clone(),
            conn: self.conn.clone(),
        })
    }

    fn conn(&self) -> Result<MultiplexedConnection> {
        self.conn.clone().ok_or(SdkError::NotConnected)
    }

    /// Serialize `payload` as JSON and put it on the queue
    pub async fn enqueue<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Job> {
        let text = serde_json::to_string(payload)?;
        self.enqueue_raw(text).await
    }

    /// Put already-serialized JSON text on the queue
    pub async fn enqueue_raw(&self, text: impl Into<String>) -> Result<Job> {
        let mut conn = self.conn()?;
        let urn = uuid::Uuid::new_v4().urn().to_string();
        let encoded = Envelope::new(text, urn.clone()).encode()?;

        let len: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(encoded)
            .query_async(&mut conn)
            .await?;

        debug!(queue = %self.name, urn = %urn, len, "Task enqueued");
        Ok(Job::new(urn, conn, self.settings.clone()))
    }

    /// Number of tasks waiting
    pub async fn length(&self) -> Result<u64> {
        let mut conn = self.conn()?;
        let len: u64 = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Names of every queue currently holding tasks, sorted
    pub async fn names(&self) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let pattern = format!("{}*", QUEUE_KEY_PREFIX);
        let mut cursor: u64 = 0;
        let mut names = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            names.extend(
                keys.iter()
                    .filter_map(|k| k.strip_prefix(QUEUE_KEY_PREFIX))
                    .map(str::to_string),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Reply to the producer of `task` from outside a worker
    ///
    /// Tasks without an id have nobody waiting; this is a no-op for them.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        task: &Task,
        result: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let Some(urn) = task.id() else {
            return Ok(());
        };
        let body = serde_json::to_string(result)?;

        let _: () = redis::pipe()
            .atomic()
            .lpush(urn.as_str(), body)
            .ignore()
            .expire(urn.as_str(), ttl.as_secs().max(1) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Re-encode a task exactly as it would sit on the queue
    pub fn encode(task: &Task) -> Result<String> {
        Ok(Envelope::from_task(task).encode()?)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("url", &self.settings.display_url())
            .field("connected", &self.conn.is_some())
            .finish()
    }
}
