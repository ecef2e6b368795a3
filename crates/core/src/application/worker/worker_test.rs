//! Unit tests for the worker loop

use super::*;
use crate::application::retry::BackoffPolicy;
use crate::domain::TaskId;
use crate::port::queue_client::mocks::{ClientEvent, DequeueStep, ScriptedQueueClient};
use crate::port::task_handler::mocks::{MockBehavior, RecordingHandler};
use crate::port::task_handler::{handler_fn, MockTaskHandler};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn test_config() -> WorkerConfig {
    WorkerConfig {
        poll_wait: Duration::from_secs(1),
        idle_delay: Duration::from_millis(100),
        backoff: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4))
            .with_max_attempts(5),
        ..Default::default()
    }
}

fn queue() -> QueueName {
    QueueName::new("jobs").unwrap()
}

fn task(payload: &str) -> DequeueStep {
    DequeueStep::Task(Task::new(payload))
}

/// Run the worker on a paused clock for `secs` of virtual time, then stop it
async fn run_for(worker: Worker, secs: u64) -> Result<WorkerStats> {
    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tx.shutdown();
    handle.await.unwrap()
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = WorkerConfig {
        max_in_flight: 0,
        ..test_config()
    };
    let result = Worker::new(
        queue(),
        Box::new(ScriptedQueueClient::default()),
        Arc::new(RecordingHandler::new_success()),
        config,
    );
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_mock_handler_sees_tasks_in_order() {
    let client = ScriptedQueueClient::new(vec![
        task("\"a\""),
        DequeueStep::Empty,
        task("\"b\""),
        task("\"c\""),
    ]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in_handler = Arc::clone(&seen);
    let mut handler = MockTaskHandler::new();
    handler.expect_handle().times(3).returning(move |task| {
        seen_in_handler
            .lock()
            .unwrap()
            .push(task.payload().to_string());
        Ok(None)
    });

    let worker = Worker::new(queue(), Box::new(client), Arc::new(handler), test_config()).unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    assert_eq!(*seen.lock().unwrap(), vec!["\"a\"", "\"b\"", "\"c\""]);
    assert_eq!(stats.tasks_received, 3);
    assert_eq!(stats.tasks_succeeded, 3);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_config_error_from_client_is_not_retried() {
    let client = ScriptedQueueClient::default()
        .fail_connect_with(AppError::Config("invalid redis url".to_string()));
    let probe = client.clone();

    let worker = Worker::new(
        queue(),
        Box::new(client),
        Arc::new(RecordingHandler::new_success()),
        test_config(),
    )
    .unwrap();
    let state = worker.subscribe_state();

    let (_tx, token) = shutdown_channel();
    let err = assert_err!(worker.run(token).await);

    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(probe.connect_attempts(), 1);
    assert_eq!(*state.borrow(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhausted_stops_worker() {
    let client = ScriptedQueueClient::default().failing_connects(10);
    let probe = client.clone();

    let worker = Worker::new(
        queue(),
        Box::new(client),
        Arc::new(RecordingHandler::new_success()),
        test_config(),
    )
    .unwrap();

    let (_tx, token) = shutdown_channel();
    let err = assert_err!(worker.run(token).await);

    match err {
        AppError::RetriesExhausted { attempts, last_error } => {
            assert_eq!(attempts, 5);
            assert!(matches!(*last_error, AppError::Connection(_)));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(probe.connect_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_protocol_error_triggers_reconnect() {
    let client = ScriptedQueueClient::new(vec![
        task("1"),
        DequeueStep::Malformed,
        task("2"),
    ]);
    let probe = client.clone();
    let handler = RecordingHandler::new_success();

    let worker = Worker::new(
        queue(),
        Box::new(client),
        Arc::new(handler.clone()),
        test_config(),
    )
    .unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    assert_eq!(handler.started(), vec!["1", "2"]);
    assert_eq!(probe.connect_attempts(), 2);
    assert_eq!(stats.reconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_payload_is_handler_failure() {
    let client = ScriptedQueueClient::new(vec![task("not json {"), task(r#"{"ok":true}"#)]);
    let probe = client.clone();

    let decoded = Arc::new(Mutex::new(Vec::new()));
    let decoded_in_handler = Arc::clone(&decoded);
    let handler = handler_fn(move |task| {
        let data = task.data()?;
        decoded_in_handler.lock().unwrap().push(data);
        Ok(None)
    });

    let worker = Worker::new(queue(), Box::new(client), Arc::new(handler), test_config()).unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    assert_eq!(*decoded.lock().unwrap(), vec![json!({"ok": true})]);
    assert_eq!(stats.tasks_failed, 1);
    assert_eq!(stats.tasks_dropped, 1);
    assert_eq!(stats.reconnects, 0);
    assert_eq!(probe.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_requeue_policy_respects_budget() {
    let client = ScriptedQueueClient::new(vec![
        DequeueStep::Task(Task::new("fresh").with_id(TaskId::new("urn:uuid:1"))),
        DequeueStep::Task(Task::new("tired").with_retries(2)),
    ]);
    let probe = client.clone();
    let handler = RecordingHandler::new(MockBehavior::Fail("nope".to_string()));

    let config = WorkerConfig {
        failure_policy: FailurePolicy::Requeue { max_requeues: 2 },
        ..test_config()
    };
    let worker = Worker::new(queue(), Box::new(client), Arc::new(handler), config).unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    let requeued = probe.requeued();
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].payload(), "fresh");
    assert_eq!(requeued[0].retries(), 1);
    assert_eq!(requeued[0].id(), Some(&TaskId::new("urn:uuid:1")));
    assert_eq!(stats.tasks_requeued, 1);
    assert_eq!(stats.tasks_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_result_replied_only_for_identified_tasks() {
    let client = ScriptedQueueClient::new(vec![
        DequeueStep::Task(Task::new(r#"{"n":1}"#).with_id(TaskId::new("urn:uuid:7"))),
        DequeueStep::Task(Task::new(r#"{"n":2}"#)),
    ]);
    let probe = client.clone();
    let handler = RecordingHandler::new(MockBehavior::Echo);

    let worker = Worker::new(queue(), Box::new(client), Arc::new(handler), test_config()).unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    let replies: Vec<_> = probe
        .events()
        .into_iter()
        .filter(|e| matches!(e, ClientEvent::Reply { .. }))
        .collect();
    assert_eq!(
        replies,
        vec![ClientEvent::Reply {
            payload: r#"{"n":1}"#.to_string(),
            result: json!({"n": 1}),
        }]
    );
    assert_eq!(stats.replies_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_does_not_stop_worker() {
    let client = ScriptedQueueClient::new(vec![task("boom"), task("after")]);
    let handler =
        RecordingHandler::new_success().on("boom", MockBehavior::Panic("kaboom".to_string()));

    let worker = Worker::new(
        queue(),
        Box::new(client),
        Arc::new(handler.clone()),
        test_config(),
    )
    .unwrap();
    let stats = assert_ok!(run_for(worker, 10).await);

    assert_eq!(handler.started(), vec!["boom", "after"]);
    assert_eq!(handler.finished(), vec!["after"]);
    assert_eq!(stats.tasks_failed, 1);
    assert_eq!(stats.tasks_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_handlers_drain_before_reconnect() {
    let client = ScriptedQueueClient::new(vec![
        task("x"),
        task("y"),
        DequeueStep::ConnectionLost,
        task("z"),
    ]);
    let probe = client.clone();
    let handler = RecordingHandler::new_success()
        .on("x", MockBehavior::Slow(Duration::from_secs(3)))
        .on("y", MockBehavior::Slow(Duration::from_secs(2)));

    let config = WorkerConfig {
        max_in_flight: 2,
        ..test_config()
    };
    let worker = Worker::new(
        queue(),
        Box::new(client),
        Arc::new(handler.clone()),
        config,
    )
    .unwrap();
    let stats = assert_ok!(run_for(worker, 20).await);

    // The reconnect waited for both slow handlers
    let events = probe.events();
    let reconnect_at = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ClientEvent::Connect { ok: true, .. }))
        .map(|(i, _)| i)
        .nth(1)
        .expect("worker should reconnect");
    assert!(events[..reconnect_at]
        .iter()
        .all(|e| !matches!(e, ClientEvent::Dequeue { got_task: false })));
    assert_eq!(handler.finished(), vec!["y", "x", "z"]);
    assert_eq!(stats.reconnects, 1);

    let connects = probe.connect_times();
    assert!(connects[1] - connects[0] >= Duration::from_secs(3));
}
