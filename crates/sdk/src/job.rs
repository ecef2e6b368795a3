//! Handle on an enqueued task's result

use crate::error::Result;
use redis::aio::MultiplexedConnection;
use retask_infra_redis::{open_connection, RedisSettings};
use std::time::Duration;
use tracing::debug;

/// A task that has been put on a queue
///
/// The worker replies by pushing the handler's result onto the list named by
/// `urn`. Once read, the result is cached here and the key is deleted.
pub struct Job {
    urn: String,
    conn: MultiplexedConnection,
    settings: RedisSettings,
    result: Option<serde_json::Value>,
}

impl Job {
    pub(crate) fn new(urn: String, conn: MultiplexedConnection, settings: RedisSettings) -> Self {
        Self {
            urn,
            conn,
            settings,
            result: None,
        }
    }

    /// `urn:uuid:...` identifier shared with the worker
    pub fn urn(&self) -> &str {
        &self.urn
    }

    /// Result if the worker already replied, without waiting
    pub async fn result(&mut self) -> Result<Option<&serde_json::Value>> {
        if self.result.is_none() {
            let raw: Option<String> = redis::cmd("RPOP")
                .arg(&self.urn)
                .query_async(&mut self.conn)
                .await?;

            if let Some(raw) = raw {
                self.store(&raw).await?;
            }
        }

        Ok(self.result.as_ref())
    }

    /// Block until the worker replies or `timeout` elapses
    ///
    /// Returns `true` when a result is available (see [`Job::result`]).
    /// The blocking pop runs on a connection of its own, so the queue handle
    /// that created this job stays usable meanwhile.
    pub async fn wait(&mut self, timeout: Duration) -> Result<bool> {
        if self.result.is_some() {
            return Ok(true);
        }

        let mut blocking = open_connection(&self.settings).await?;

        // BRPOP 0 blocks forever
        let seconds = timeout.as_secs_f64().max(0.001);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.urn)
            .arg(seconds)
            .query_async(&mut blocking)
            .await?;

        match popped {
            Some((_, raw)) => {
                self.store(&raw).await?;
                Ok(true)
            }
            None => {
                debug!(urn = %self.urn, ?timeout, "No result yet");
                Ok(false)
            }
        }
    }

    async fn store(&mut self, raw: &str) -> Result<()> {
        let _: i64 = redis::cmd("DEL")
            .arg(&self.urn)
            .query_async(&mut self.conn)
            .await?;
        self.result = Some(serde_json::from_str(raw)?);
        Ok(())
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("urn", &self.urn)
            .field("result", &self.result)
            .finish()
    }
}
