// Redis QueueClient Implementation

use crate::connection::{classify_redis_error, open_connection};
use crate::envelope::{decode_task, queue_key, Envelope};
use crate::settings::{RedisSettings, DEFAULT_REPLY_TTL};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use retask_core::domain::{QueueName, Task};
use retask_core::error::{AppError, Result};
use retask_core::port::QueueClient;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra time granted to a blocking pop on top of its server-side timeout
/// before the session is considered hung
const BLOCKING_GRACE: Duration = Duration::from_secs(2);

/// QueueClient backed by a Redis list
///
/// One instance owns at most one connection, bound to one queue key.
pub struct RedisQueueClient {
    settings: RedisSettings,
    reply_ttl: Duration,
    key: Option<String>,
    conn: Option<MultiplexedConnection>,
}

impl RedisQueueClient {
    pub fn new(settings: RedisSettings) -> Self {
        Self {
            settings,
            reply_ttl: DEFAULT_REPLY_TTL,
            key: None,
            conn: None,
        }
    }

    /// How long a reply stays readable by the producer
    pub fn with_reply_ttl(mut self, ttl: Duration) -> Self {
        self.reply_ttl = ttl;
        self
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    fn session(&self) -> Result<(MultiplexedConnection, &str)> {
        match (&self.conn, &self.key) {
            (Some(conn), Some(key)) => Ok((conn.clone(), key.as_str())),
            _ => Err(AppError::Connection("not connected".to_string())),
        }
    }

    /// Forget the connection when the error means it can no longer be trusted
    fn on_error(&mut self, err: AppError) -> AppError {
        if err.is_session_fault() {
            self.conn = None;
        }
        err
    }
}

/// Turn a BRPOP reply into a task
///
/// The element is read as bytes: invalid UTF-8 is replaced rather than
/// rejected, so a bad payload surfaces in the handler and not as a session
/// fault.
fn parse_pop(reply: &redis::Value, key: &str) -> Result<Option<Task>> {
    let popped: Option<(String, Vec<u8>)> =
        redis::from_redis_value(reply).map_err(|e| classify_redis_error(e, "BRPOP"))?;

    match popped {
        None => Ok(None),
        Some((popped_key, raw)) => {
            if popped_key != key {
                return Err(AppError::Protocol(format!(
                    "BRPOP answered for key {:?}, expected {:?}",
                    popped_key, key
                )));
            }
            Ok(Some(decode_task(&String::from_utf8_lossy(&raw))))
        }
    }
}

impl std::fmt::Debug for RedisQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueClient")
            .field("url", &self.settings.display_url())
            .field("key", &self.key)
            .field("connected", &self.conn.is_some())
            .field("reply_ttl", &self.reply_ttl)
            .finish()
    }
}

#[async_trait]
impl QueueClient for RedisQueueClient {
    async fn connect(&mut self, queue: &QueueName) -> Result<()> {
        // Never keep two sessions around
        if self.conn.take().is_some() {
            debug!("Dropping previous Redis connection before reconnecting");
        }

        let conn = open_connection(&self.settings).await?;
        let key = queue_key(queue);

        info!(
            url = %self.settings.display_url(),
            key = %key,
            "Connected to Redis queue"
        );

        self.key = Some(key);
        self.conn = Some(conn);
        Ok(())
    }

    async fn dequeue(&mut self, wait: Duration) -> Result<Option<Task>> {
        let (mut conn, key) = self.session()?;
        let key = key.to_string();

        // BRPOP takes fractional seconds (Redis >= 6); 0 would mean "forever"
        let seconds = wait.as_secs_f64().max(0.001);

        let pop = async {
            let reply: redis::Value = redis::cmd("BRPOP")
                .arg(&key)
                .arg(seconds)
                .query_async(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(reply)
        };

        // Once the deadline fires an element already popped server-side is lost
        let reply = match tokio::time::timeout(wait + BLOCKING_GRACE, pop).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(self.on_error(classify_redis_error(e, "BRPOP"))),
            Err(_) => {
                warn!(
                    key = %key,
                    "BRPOP did not return in time, dropping connection; a task popped in this window is lost"
                );
                self.conn = None;
                return Err(AppError::Connection(format!(
                    "BRPOP on {} exceeded {:?}",
                    key,
                    wait + BLOCKING_GRACE
                )));
            }
        };

        parse_pop(&reply, &key).map_err(|e| self.on_error(e))
    }

    async fn requeue(&mut self, task: &Task) -> Result<()> {
        let (mut conn, key) = self.session()?;
        let key = key.to_string();
        let encoded = Envelope::from_task(task).encode()?;

        let pushed: std::result::Result<i64, _> = redis::cmd("LPUSH")
            .arg(&key)
            .arg(encoded)
            .query_async(&mut conn)
            .await;

        match pushed {
            Ok(len) => {
                debug!(task_id = %task.log_id(), key = %key, len, "Task requeued");
                Ok(())
            }
            Err(e) => Err(self.on_error(classify_redis_error(e, "LPUSH"))),
        }
    }

    async fn reply(&mut self, task: &Task, result: &serde_json::Value) -> Result<()> {
        let Some(urn) = task.id() else {
            return Ok(());
        };
        let (mut conn, _) = self.session()?;
        let body = serde_json::to_string(result)?;
        let ttl = self.reply_ttl.as_secs().max(1) as i64;

        let written: std::result::Result<(), _> = redis::pipe()
            .atomic()
            .lpush(urn.as_str(), body)
            .ignore()
            .expire(urn.as_str(), ttl)
            .ignore()
            .query_async(&mut conn)
            .await;

        written.map_err(|e| self.on_error(classify_redis_error(e, "reply")))
    }

    async fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!(url = %self.settings.display_url(), "Redis connection released");
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}
