// Queue Client Port (Interface)
// Anything offering connect + bounded dequeue can back a Worker

use crate::domain::{QueueName, Task};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Session with the external queue service
///
/// The client exclusively owns its connection: at most one live session per
/// instance. Implementations are driven by a single worker loop, hence
/// `&mut self` everywhere.
#[async_trait]
pub trait QueueClient: Send {
    /// Open a session bound to `queue`
    ///
    /// Safe to call again after a failure or after a lost session: any
    /// previous connection is released first, nothing leaks.
    ///
    /// # Errors
    /// - `AppError::Connection` if the backend is unreachable or rejects the session
    /// - `AppError::Config` if the client settings themselves are invalid
    async fn connect(&mut self, queue: &QueueName) -> Result<()>;

    /// Fetch the next task, waiting at most `wait`
    ///
    /// `Ok(None)` means nothing arrived within the window; it is the normal
    /// outcome on an idle queue. Must never block indefinitely.
    ///
    /// # Errors
    /// - `AppError::Connection` if the session was lost
    /// - `AppError::Protocol` if the backend answered with something malformed
    async fn dequeue(&mut self, wait: Duration) -> Result<Option<Task>>;

    /// Put a failed task back on the queue
    async fn requeue(&mut self, task: &Task) -> Result<()>;

    /// Deliver a handler result to whoever is waiting on `task`
    async fn reply(&mut self, task: &Task, result: &serde_json::Value) -> Result<()>;

    /// Release the session (no-op when not connected)
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted answer to `dequeue`
    #[derive(Debug, Clone)]
    pub enum DequeueStep {
        /// Deliver a task immediately
        Task(Task),
        /// Return `None` after the full wait window
        Empty,
        /// Fail with `AppError::Connection` and drop the session
        ConnectionLost,
        /// Fail with `AppError::Protocol` (session is left open; the worker must reconnect anyway)
        Malformed,
    }

    /// Everything the worker did to the client, in order
    #[derive(Debug, Clone, PartialEq)]
    pub enum ClientEvent {
        Connect { queue: String, ok: bool },
        Dequeue { got_task: bool },
        Requeue { payload: String, retries: u32 },
        Reply { payload: String, result: serde_json::Value },
        Disconnect,
    }

    #[derive(Default)]
    struct ScriptState {
        connect_failures: VecDeque<AppError>,
        steps: VecDeque<DequeueStep>,
        connected: bool,
        connect_times: Vec<tokio::time::Instant>,
        events: Vec<ClientEvent>,
        requeued: Vec<Task>,
    }

    /// Queue client replaying a fixed script
    ///
    /// Clones share state, so a test keeps one clone for inspection while the
    /// worker owns another. Once the script runs out every `dequeue` is `Empty`.
    #[derive(Clone, Default)]
    pub struct ScriptedQueueClient {
        state: Arc<Mutex<ScriptState>>,
    }

    impl ScriptedQueueClient {
        pub fn new(steps: impl IntoIterator<Item = DequeueStep>) -> Self {
            let client = Self::default();
            client.state.lock().unwrap().steps.extend(steps);
            client
        }

        /// Make the next `n` connect attempts fail with a connection error
        pub fn failing_connects(self, n: usize) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                for i in 0..n {
                    state
                        .connect_failures
                        .push_back(AppError::Connection(format!("connection refused ({})", i + 1)));
                }
            }
            self
        }

        /// Make the next connect attempt fail with `error`
        pub fn fail_connect_with(self, error: AppError) -> Self {
            self.state.lock().unwrap().connect_failures.push_back(error);
            self
        }

        pub fn push_step(&self, step: DequeueStep) {
            self.state.lock().unwrap().steps.push_back(step);
        }

        pub fn events(&self) -> Vec<ClientEvent> {
            self.state.lock().unwrap().events.clone()
        }

        pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
            self.state.lock().unwrap().connect_times.clone()
        }

        pub fn connect_attempts(&self) -> usize {
            self.connect_times().len()
        }

        pub fn requeued(&self) -> Vec<Task> {
            self.state.lock().unwrap().requeued.clone()
        }

        pub fn remaining_steps(&self) -> usize {
            self.state.lock().unwrap().steps.len()
        }

        fn not_connected() -> AppError {
            AppError::Connection("not connected".to_string())
        }
    }

    #[async_trait]
    impl QueueClient for ScriptedQueueClient {
        async fn connect(&mut self, queue: &QueueName) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.connect_times.push(tokio::time::Instant::now());
            state.connected = false;

            match state.connect_failures.pop_front() {
                Some(err) => {
                    state.events.push(ClientEvent::Connect {
                        queue: queue.to_string(),
                        ok: false,
                    });
                    Err(err)
                }
                None => {
                    state.connected = true;
                    state.events.push(ClientEvent::Connect {
                        queue: queue.to_string(),
                        ok: true,
                    });
                    Ok(())
                }
            }
        }

        async fn dequeue(&mut self, wait: Duration) -> Result<Option<Task>> {
            let step = {
                let mut state = self.state.lock().unwrap();
                if !state.connected {
                    return Err(Self::not_connected());
                }
                state.steps.pop_front().unwrap_or(DequeueStep::Empty)
            };

            match step {
                DequeueStep::Task(task) => {
                    self.state
                        .lock()
                        .unwrap()
                        .events
                        .push(ClientEvent::Dequeue { got_task: true });
                    Ok(Some(task))
                }
                DequeueStep::Empty => {
                    tokio::time::sleep(wait).await;
                    self.state
                        .lock()
                        .unwrap()
                        .events
                        .push(ClientEvent::Dequeue { got_task: false });
                    Ok(None)
                }
                DequeueStep::ConnectionLost => {
                    self.state.lock().unwrap().connected = false;
                    Err(AppError::Connection("connection reset by peer".to_string()))
                }
                DequeueStep::Malformed => {
                    Err(AppError::Protocol("unexpected reply type".to_string()))
                }
            }
        }

        async fn requeue(&mut self, task: &Task) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return Err(Self::not_connected());
            }
            state.events.push(ClientEvent::Requeue {
                payload: task.payload().to_string(),
                retries: task.retries(),
            });
            state.requeued.push(task.clone());
            Ok(())
        }

        async fn reply(&mut self, task: &Task, result: &serde_json::Value) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if !state.connected {
                return Err(Self::not_connected());
            }
            state.events.push(ClientEvent::Reply {
                payload: task.payload().to_string(),
                result: result.clone(),
            });
            Ok(())
        }

        async fn disconnect(&mut self) {
            let mut state = self.state.lock().unwrap();
            state.connected = false;
            state.events.push(ClientEvent::Disconnect);
        }

        fn is_connected(&self) -> bool {
            self.state.lock().unwrap().connected
        }
    }
}
