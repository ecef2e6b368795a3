// Worker - Queue consumption loop

pub mod config;
pub mod constants;
mod panic_guard;
mod shutdown;
mod stats;

#[cfg(test)]
mod worker_test;

pub use config::{FailurePolicy, WorkerConfig};
pub use panic_guard::{execute_guarded_async, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use stats::WorkerStats;

use crate::application::retry::RetryDecision;
use crate::domain::{HandlerError, QueueName, Task, WorkerState};
use crate::error::{AppError, Result};
use crate::port::{HandlerOutcome, QueueClient, TaskHandler};
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// A handler run that has completed, with the task it ran on
type Finished = (Task, HandlerOutcome);

enum ConnectOutcome {
    Connected,
    Interrupted,
}

enum PollExit {
    Shutdown,
    SessionLost(AppError),
}

/// Worker consumes one queue through a `QueueClient`
///
/// State machine:
/// - `Idle -> Running` once `connect` succeeds (failures retried with backoff)
/// - `Running -> Idle` when `dequeue` reports a lost or corrupted session
/// - `* -> Stopped` on shutdown, bad configuration or an exhausted retry budget
///
/// Handlers never overlap with a reconnect, and shutdown drains in-flight
/// handlers before the connection is released.
pub struct Worker {
    queue: QueueName,
    client: Box<dyn QueueClient>,
    handler: Arc<dyn TaskHandler>,
    config: WorkerConfig,
    state_tx: watch::Sender<WorkerState>,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker bound to `queue`
    ///
    /// # Errors
    /// `AppError::Config` if `config` is invalid; the worker never starts.
    pub fn new(
        queue: QueueName,
        client: Box<dyn QueueClient>,
        handler: Arc<dyn TaskHandler>,
        config: WorkerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(WorkerState::Idle);

        Ok(Self {
            queue,
            client,
            handler,
            config,
            state_tx,
            stats: WorkerStats::new(),
        })
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions (e.g. wait for `Running` in tests or health checks)
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    /// Run until shutdown or an unrecoverable error
    ///
    /// Returns the run statistics on a clean stop. Returns an error only for
    /// `AppError::Config` (reported by the client at connect time) and
    /// `AppError::RetriesExhausted`; connection loss, protocol errors and
    /// handler failures are all contained here.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<WorkerStats> {
        info!(
            queue = %self.queue,
            max_in_flight = self.config.max_in_flight,
            poll_wait_ms = self.config.poll_wait.as_millis() as u64,
            "Worker started"
        );

        let result = self.run_cycles(&mut shutdown).await;

        self.client.disconnect().await;
        self.set_state(WorkerState::Stopped);
        self.stats.stopped_at = Some(chrono::Utc::now());

        match result {
            Ok(()) => {
                info!(
                    queue = %self.queue,
                    received = self.stats.tasks_received,
                    succeeded = self.stats.tasks_succeeded,
                    failed = self.stats.tasks_failed,
                    reconnects = self.stats.reconnects,
                    "Worker stopped"
                );
                Ok(self.stats)
            }
            Err(e) => {
                error!(
                    queue = %self.queue,
                    error_kind = %e.kind(),
                    error = %e,
                    "Worker stopped on unrecoverable error"
                );
                Err(e)
            }
        }
    }

    async fn run_cycles(&mut self, shutdown: &mut ShutdownToken) -> Result<()> {
        loop {
            match self.connect_with_backoff(shutdown).await? {
                ConnectOutcome::Interrupted => return Ok(()),
                ConnectOutcome::Connected => self.set_state(WorkerState::Running),
            }

            match self.poll(shutdown).await {
                PollExit::Shutdown => return Ok(()),
                PollExit::SessionLost(err) => {
                    warn!(
                        queue = %self.queue,
                        error_kind = %err.kind(),
                        error = %err,
                        "Queue session lost, reconnecting"
                    );
                    self.client.disconnect().await;
                    self.stats.reconnects += 1;
                    self.set_state(WorkerState::Idle);
                }
            }
        }
    }

    async fn connect_with_backoff(&mut self, shutdown: &mut ShutdownToken) -> Result<ConnectOutcome> {
        let mut failures: u32 = 0;

        loop {
            if shutdown.is_shutdown() {
                info!(queue = %self.queue, "Worker interrupted before connecting");
                return Ok(ConnectOutcome::Interrupted);
            }

            let attempt = failures + 1;
            self.stats.connect_attempts += 1;

            let err = match self.client.connect(&self.queue).await {
                Ok(()) => {
                    info!(queue = %self.queue, attempt, "Connected to queue");
                    return Ok(ConnectOutcome::Connected);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => err,
            };

            failures += 1;
            match self.config.backoff.should_retry(failures) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        queue = %self.queue,
                        attempt,
                        error_kind = %err.kind(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Connect failed, retrying"
                    );
                    tokio::select! {
                        _ = sleep(delay) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %self.queue, "Worker interrupted during connect backoff");
                            return Ok(ConnectOutcome::Interrupted);
                        }
                    }
                }
                RetryDecision::GiveUp => {
                    error!(
                        queue = %self.queue,
                        attempt,
                        error_kind = %err.kind(),
                        error = %err,
                        "Connect failed, retry budget exhausted"
                    );
                    return Err(AppError::RetriesExhausted {
                        attempts: failures,
                        last_error: Box::new(err),
                    });
                }
            }
        }
    }

    async fn poll(&mut self, shutdown: &mut ShutdownToken) -> PollExit {
        let mut in_flight: JoinSet<Finished> = JoinSet::new();

        loop {
            // At capacity: wait for a handler to finish before taking more work
            while in_flight.len() >= self.config.max_in_flight {
                if let Some(joined) = in_flight.join_next().await {
                    if let Err(err) = self.settle(joined).await {
                        return self.abandon_session(&mut in_flight, err).await;
                    }
                }
            }

            // Safe point: no dequeue pending, no handler interrupted
            if shutdown.is_shutdown() {
                info!(
                    queue = %self.queue,
                    in_flight = in_flight.len(),
                    "Shutdown requested, draining in-flight tasks"
                );
                self.drain(&mut in_flight).await;
                return PollExit::Shutdown;
            }

            // Never raced against shutdown: a cancelled dequeue could lose a popped task.
            // The wait window bounds how long shutdown has to wait here.
            match self.client.dequeue(self.config.poll_wait).await {
                Ok(Some(task)) => {
                    self.stats.tasks_received += 1;
                    debug!(queue = %self.queue, task_id = task.log_id(), "Task received");
                    self.dispatch(&mut in_flight, task);
                }
                Ok(None) => {
                    if !self.config.idle_delay.is_zero() {
                        tokio::select! {
                            _ = sleep(self.config.idle_delay) => {},
                            _ = shutdown.wait() => {}
                        }
                    }
                }
                Err(err) => return self.abandon_session(&mut in_flight, err).await,
            }

            // Report whatever already finished without blocking
            while let Some(joined) = in_flight.join_next().now_or_never().flatten() {
                if let Err(err) = self.settle(joined).await {
                    return self.abandon_session(&mut in_flight, err).await;
                }
            }
        }
    }

    fn dispatch(&self, in_flight: &mut JoinSet<Finished>, task: Task) {
        let handler = Arc::clone(&self.handler);

        in_flight.spawn(async move {
            let outcome = match execute_guarded_async(handler.handle(&task)).await {
                PanicGuardResult::Success(outcome) => outcome,
                PanicGuardResult::Panicked(msg) => Err(HandlerError::Panicked(msg)),
            };
            (task, outcome)
        });
    }

    /// Record a finished handler run and report its outcome to the backend
    ///
    /// Only session faults are returned; everything else is logged here.
    async fn settle(&mut self, joined: std::result::Result<Finished, JoinError>) -> Result<()> {
        let (task, outcome) = match joined {
            Ok(finished) => finished,
            Err(join_err) => {
                // Handler futures are panic-guarded and never aborted
                self.stats.tasks_failed += 1;
                self.stats.tasks_dropped += 1;
                error!(queue = %self.queue, error = %join_err, "Handler task did not complete");
                return Ok(());
            }
        };

        match outcome {
            Ok(result) => {
                self.stats.tasks_succeeded += 1;
                debug!(queue = %self.queue, task_id = task.log_id(), "Task handled");

                match (result, task.id()) {
                    (Some(value), Some(_)) => self.send_reply(&task, &value).await,
                    (Some(_), None) => {
                        debug!(queue = %self.queue, "Handler result discarded, task has no id");
                        Ok(())
                    }
                    (None, _) => Ok(()),
                }
            }
            Err(handler_err) => {
                self.stats.tasks_failed += 1;
                error!(
                    queue = %self.queue,
                    task_id = task.log_id(),
                    retries = task.retries(),
                    error_kind = "handler",
                    error = %handler_err,
                    "Task handler failed"
                );
                self.apply_failure_policy(&task).await
            }
        }
    }

    async fn send_reply(&mut self, task: &Task, value: &serde_json::Value) -> Result<()> {
        match self.client.reply(task, value).await {
            Ok(()) => {
                self.stats.replies_sent += 1;
                Ok(())
            }
            Err(err) if err.is_session_fault() => Err(err),
            Err(err) => {
                warn!(
                    queue = %self.queue,
                    task_id = task.log_id(),
                    error_kind = %err.kind(),
                    error = %err,
                    "Could not deliver task result"
                );
                Ok(())
            }
        }
    }

    async fn apply_failure_policy(&mut self, task: &Task) -> Result<()> {
        match self.config.failure_policy {
            FailurePolicy::Drop => {
                self.stats.tasks_dropped += 1;
                warn!(queue = %self.queue, task_id = task.log_id(), "Dropping failed task");
                Ok(())
            }
            FailurePolicy::Requeue { max_requeues } if task.retries() < max_requeues => {
                let retry = task.for_retry();
                match self.client.requeue(&retry).await {
                    Ok(()) => {
                        self.stats.tasks_requeued += 1;
                        info!(
                            queue = %self.queue,
                            task_id = task.log_id(),
                            retries = retry.retries(),
                            "Requeued failed task"
                        );
                        Ok(())
                    }
                    Err(err) => {
                        self.stats.tasks_dropped += 1;
                        error!(
                            queue = %self.queue,
                            task_id = task.log_id(),
                            error_kind = %err.kind(),
                            error = %err,
                            "Requeue failed, task lost"
                        );
                        if err.is_session_fault() {
                            Err(err)
                        } else {
                            Ok(())
                        }
                    }
                }
            }
            FailurePolicy::Requeue { max_requeues } => {
                self.stats.tasks_dropped += 1;
                warn!(
                    queue = %self.queue,
                    task_id = task.log_id(),
                    max_requeues,
                    "Requeue budget exhausted, dropping task"
                );
                Ok(())
            }
        }
    }

    async fn abandon_session(&mut self, in_flight: &mut JoinSet<Finished>, err: AppError) -> PollExit {
        if !in_flight.is_empty() {
            warn!(
                queue = %self.queue,
                in_flight = in_flight.len(),
                "Waiting for in-flight tasks before reconnecting"
            );
        }
        self.drain(in_flight).await;
        PollExit::SessionLost(err)
    }

    async fn drain(&mut self, in_flight: &mut JoinSet<Finished>) {
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = self.settle(joined).await {
                warn!(
                    queue = %self.queue,
                    error_kind = %err.kind(),
                    error = %err,
                    "Could not report task outcome while draining"
                );
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(queue = %self.queue, from = %previous, to = %state, "Worker state changed");
        }
    }
}
