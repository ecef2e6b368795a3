// Task Handler Port
// Operator-supplied logic executed once per dequeued task

use crate::domain::{HandlerError, Task};
use async_trait::async_trait;

/// What a handler produced: `Some(value)` is sent back to the producer when
/// the task carries an identifier, `None` means nothing to report.
pub type HandlerOutcome = Result<Option<serde_json::Value>, HandlerError>;

/// Task handler trait
///
/// Handlers only see the task; they have no access to the worker's client
/// or state. A handler may fail or even panic: either way the worker logs
/// it, applies its failure policy and moves on to the next task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> HandlerOutcome;
}

/// Adapter turning a plain closure into a `TaskHandler`
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(&Task) -> HandlerOutcome + Send + Sync,
{
    async fn handle(&self, task: &Task) -> HandlerOutcome {
        (self.f)(task)
    }
}

/// Wrap a synchronous closure as a handler
///
/// # Example
/// ```
/// use retask_core::port::task_handler::handler_fn;
///
/// let handler = handler_fn(|task| {
///     let data = task.data()?;
///     println!("{}", data);
///     Ok(None)
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Task) -> HandlerOutcome + Send + Sync,
{
    FnHandler { f }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Recording handler behavior, picked per payload
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed without a result
        Success,
        /// Succeed and echo the decoded payload back as the result
        Echo,
        /// Fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Sleep, then succeed
        Slow(Duration),
    }

    #[derive(Default)]
    struct Recorded {
        started: Vec<String>,
        finished: Vec<String>,
    }

    /// Handler that records every payload it sees
    ///
    /// Behavior defaults to `Success`; individual payloads can be given
    /// their own behavior with [`RecordingHandler::on`].
    #[derive(Clone)]
    pub struct RecordingHandler {
        default: MockBehavior,
        overrides: Arc<Mutex<Vec<(String, MockBehavior)>>>,
        recorded: Arc<Mutex<Recorded>>,
        started_notify: Arc<tokio::sync::Notify>,
    }

    impl RecordingHandler {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                overrides: Arc::new(Mutex::new(Vec::new())),
                recorded: Arc::new(Mutex::new(Recorded::default())),
                started_notify: Arc::new(tokio::sync::Notify::new()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        /// Use `behavior` for tasks whose raw payload equals `payload`
        pub fn on(self, payload: impl Into<String>, behavior: MockBehavior) -> Self {
            self.overrides
                .lock()
                .unwrap()
                .push((payload.into(), behavior));
            self
        }

        /// Payloads in the order handling started
        pub fn started(&self) -> Vec<String> {
            self.recorded.lock().unwrap().started.clone()
        }

        /// Payloads in the order handling completed (panics excluded)
        pub fn finished(&self) -> Vec<String> {
            self.recorded.lock().unwrap().finished.clone()
        }

        pub fn call_count(&self) -> usize {
            self.started().len()
        }

        /// Resolves once the next handler invocation has started
        pub async fn wait_started(&self) {
            self.started_notify.notified().await
        }

        fn behavior_for(&self, payload: &str) -> MockBehavior {
            self.overrides
                .lock()
                .unwrap()
                .iter()
                .find(|(p, _)| p == payload)
                .map(|(_, b)| b.clone())
                .unwrap_or_else(|| self.default.clone())
        }
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&self, task: &Task) -> HandlerOutcome {
            let payload = task.payload().to_string();
            self.recorded.lock().unwrap().started.push(payload.clone());
            self.started_notify.notify_one();

            let outcome = match self.behavior_for(&payload) {
                MockBehavior::Success => Ok(None),
                MockBehavior::Echo => task.data().map(Some),
                MockBehavior::Fail(msg) => Err(HandlerError::Failed(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(None)
                }
            };

            self.recorded.lock().unwrap().finished.push(payload);
            outcome
        }
    }
}
