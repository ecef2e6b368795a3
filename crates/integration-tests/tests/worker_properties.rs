//! Worker loop behavior against a scripted queue backend
//!
//! All tests run on a paused clock: sleeps and wait windows advance virtual
//! time instantly, so timing assertions are exact.

use std::sync::Arc;
use std::time::Duration;

use retask_core::application::retry::BackoffPolicy;
use retask_core::application::{shutdown_channel, Worker, WorkerConfig, WorkerStats};
use retask_core::domain::{QueueName, Task, TaskId, WorkerState};
use retask_core::port::queue_client::mocks::{ClientEvent, DequeueStep, ScriptedQueueClient};
use retask_core::port::task_handler::mocks::{MockBehavior, RecordingHandler};
use retask_core::port::QueueClient;
use retask_core::{AppError, Result};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_test::assert_ok;

const POLL_WAIT: Duration = Duration::from_secs(1);

fn config() -> WorkerConfig {
    WorkerConfig {
        poll_wait: POLL_WAIT,
        idle_delay: Duration::from_millis(100),
        backoff: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(4))
            .with_max_attempts(5),
        ..Default::default()
    }
}

fn worker(client: &ScriptedQueueClient, handler: &RecordingHandler) -> Worker {
    Worker::new(
        QueueName::new("jobs").unwrap(),
        Box::new(client.clone()),
        Arc::new(handler.clone()),
        config(),
    )
    .unwrap()
}

fn task(id: &str, payload: &str) -> DequeueStep {
    DequeueStep::Task(Task::new(payload).with_id(TaskId::new(id)))
}

async fn wait_for(states: &mut watch::Receiver<WorkerState>, wanted: WorkerState) {
    states.wait_for(|s| *s == wanted).await.unwrap();
}

/// Run the worker for `secs` of virtual time, then request shutdown
async fn run_for(worker: Worker, secs: u64) -> Result<WorkerStats> {
    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tx.shutdown();
    handle.await.unwrap()
}

/// Handler sees exactly the tasks, in retrieval order, whatever the empties between them
#[tokio::test(start_paused = true)]
async fn test_tasks_handled_once_in_order() {
    let patterns: &[&[Option<&str>]] = &[
        &[],
        &[None, None, None],
        &[Some("1")],
        &[Some("1"), Some("2"), Some("3")],
        &[None, Some("1"), None, None, Some("2"), Some("3"), None],
        &[Some("1"), None, Some("2"), None, Some("3"), None, Some("4"), Some("5")],
    ];

    for pattern in patterns {
        let steps = pattern.iter().map(|step| match step {
            Some(p) => DequeueStep::Task(Task::new(*p)),
            None => DequeueStep::Empty,
        });
        let expected: Vec<String> = pattern.iter().flatten().map(|p| p.to_string()).collect();

        let client = ScriptedQueueClient::new(steps);
        let handler = RecordingHandler::new_success();

        let stats = assert_ok!(run_for(worker(&client, &handler), 20).await);

        assert_eq!(handler.started(), expected, "pattern {:?}", pattern);
        assert_eq!(stats.tasks_received as usize, expected.len());
        assert_eq!(client.remaining_steps(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_connection_error_leads_to_reconnect() {
    let client = ScriptedQueueClient::new(vec![
        DequeueStep::ConnectionLost,
        DequeueStep::Task(Task::new("after")),
    ]);
    let handler = RecordingHandler::new_success();

    let stats = assert_ok!(run_for(worker(&client, &handler), 10).await);

    assert_eq!(client.connect_attempts(), 2);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(handler.started(), vec!["after"]);
}

#[tokio::test(start_paused = true)]
async fn test_handler_error_does_not_block_next_task() {
    let client = ScriptedQueueClient::new(vec![
        DequeueStep::Task(Task::new("bad")),
        DequeueStep::Task(Task::new("good")),
    ]);
    let handler =
        RecordingHandler::new_success().on("bad", MockBehavior::Fail("disk full".to_string()));

    let stats = assert_ok!(run_for(worker(&client, &handler), 10).await);

    assert_eq!(handler.finished(), vec!["bad", "good"]);
    assert_eq!(stats.tasks_failed, 1);
    assert_eq!(stats.tasks_succeeded, 1);
    // Handler failures never touch the session
    assert_eq!(client.connect_attempts(), 1);
    assert_eq!(stats.reconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_idle_stops_within_poll_window() {
    let client = ScriptedQueueClient::default();
    let handler = RecordingHandler::new_success();
    let worker = worker(&client, &handler);
    let mut states = worker.subscribe_state();

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    wait_for(&mut states, WorkerState::Running).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let requested = Instant::now();
    tx.shutdown();
    assert_ok!(handle.await.unwrap());

    assert!(requested.elapsed() <= POLL_WAIT);
    assert_eq!(*states.borrow(), WorkerState::Stopped);
    assert!(!client.events().is_empty());
    assert_eq!(client.events().last(), Some(&ClientEvent::Disconnect));
    assert_eq!(handler.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_running_handler() {
    let client = ScriptedQueueClient::new(vec![DequeueStep::Task(Task::new("long"))]);
    let handler =
        RecordingHandler::new_success().on("long", MockBehavior::Slow(Duration::from_secs(5)));
    let worker = worker(&client, &handler);
    let mut states = worker.subscribe_state();

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    handler.wait_started().await;

    let requested = Instant::now();
    tx.shutdown();

    // Still running mid-handler
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*states.borrow(), WorkerState::Running);
    assert!(handler.finished().is_empty());

    let stats = assert_ok!(handle.await.unwrap());
    assert!(requested.elapsed() >= Duration::from_secs(4));
    assert_eq!(handler.finished(), vec!["long"]);
    assert_eq!(stats.tasks_succeeded, 1);
    wait_for(&mut states, WorkerState::Stopped).await;
}

/// Dropping the sender counts as a shutdown request
#[tokio::test(start_paused = true)]
async fn test_dropped_sender_stops_worker() {
    let client = ScriptedQueueClient::default();
    let handler = RecordingHandler::new_success();
    let worker = worker(&client, &handler);

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    tokio::time::sleep(Duration::from_secs(3)).await;
    drop(tx);

    assert_ok!(handle.await.unwrap());
    assert!(!client.is_connected());
    assert_eq!(client.events().last(), Some(&ClientEvent::Disconnect));
}

#[tokio::test(start_paused = true)]
async fn test_jobs_scenario() {
    let client = ScriptedQueueClient::new(vec![
        task("1", "a"),
        DequeueStep::Empty,
        DequeueStep::Empty,
        DequeueStep::Empty,
        task("2", "b"),
        DequeueStep::ConnectionLost,
        task("3", "c"),
    ]);
    let handler = RecordingHandler::new_success();

    let stats = assert_ok!(run_for(worker(&client, &handler), 30).await);

    assert_eq!(handler.started(), vec!["a", "b", "c"]);
    assert_eq!(stats.reconnects, 1);

    // The reconnect happened between b and c, with no handler call of its own
    let events = client.events();
    let connects: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ClientEvent::Connect { ok: true, .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(connects.len(), 2);
    let tasks_before = events[..connects[1]]
        .iter()
        .filter(|e| matches!(e, ClientEvent::Dequeue { got_task: true }))
        .count();
    assert_eq!(tasks_before, 2);
    // The lost session is released before the new one opens
    let between = &events[connects[0]..connects[1]];
    assert_eq!(between.last(), Some(&ClientEvent::Disconnect));
    assert_eq!(
        between.iter().filter(|e| **e == ClientEvent::Disconnect).count(),
        1
    );
    assert!(matches!(
        &events[connects[0]],
        ClientEvent::Connect { queue, .. } if queue == "jobs"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_scenario_reaches_running_on_third_attempt() {
    let client = ScriptedQueueClient::default().failing_connects(2);
    let handler = RecordingHandler::new_success();
    let worker = worker(&client, &handler);
    let mut states = worker.subscribe_state();

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    wait_for(&mut states, WorkerState::Running).await;

    assert_eq!(client.connect_attempts(), 3);
    let times = client.connect_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert!(gaps.iter().all(|gap| *gap <= Duration::from_secs(4)));

    tx.shutdown();
    let stats = assert_ok!(handle.await.unwrap());
    assert_eq!(stats.connect_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_never_exceeds_cap() {
    let client = ScriptedQueueClient::default().failing_connects(4);
    let handler = RecordingHandler::new_success();
    let worker = worker(&client, &handler);
    let mut states = worker.subscribe_state();

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    wait_for(&mut states, WorkerState::Running).await;

    let times = client.connect_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4),
        ]
    );

    tx.shutdown();
    assert_ok!(handle.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff() {
    let client = ScriptedQueueClient::default().failing_connects(100);
    let handler = RecordingHandler::new_success();
    let worker = Worker::new(
        QueueName::new("jobs").unwrap(),
        Box::new(client.clone()),
        Arc::new(handler),
        WorkerConfig {
            backoff: BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(60)),
            ..config()
        },
    )
    .unwrap();

    let (tx, token) = shutdown_channel();
    let handle = tokio::spawn(worker.run(token));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let requested = Instant::now();
    tx.shutdown();
    assert_ok!(handle.await.unwrap());

    assert!(requested.elapsed() < Duration::from_secs(1));
    assert_eq!(client.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_never_reaches_running() {
    let client = ScriptedQueueClient::default()
        .fail_connect_with(AppError::Config("unknown queue namespace".to_string()));
    let handler = RecordingHandler::new_success();
    let worker = worker(&client, &handler);
    let states = worker.subscribe_state();

    let (_tx, token) = shutdown_channel();
    let err = worker.run(token).await.unwrap_err();

    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(client.connect_attempts(), 1);
    assert_eq!(*states.borrow(), WorkerState::Stopped);
    assert!(client
        .events()
        .iter()
        .all(|e| !matches!(e, ClientEvent::Connect { ok: true, .. })));
}

/// Two independent workers in one process, each with its own session
#[tokio::test(start_paused = true)]
async fn test_independent_workers() {
    let first = ScriptedQueueClient::new(vec![DequeueStep::Task(Task::new("one"))]);
    let second = ScriptedQueueClient::new(vec![
        DequeueStep::ConnectionLost,
        DequeueStep::Task(Task::new("two")),
    ]);
    let handler = RecordingHandler::new_success();

    let (tx, token) = shutdown_channel();
    let a = tokio::spawn(worker(&first, &handler).run(token));
    let b = tokio::spawn(worker(&second, &handler).run(tx.subscribe()));
    tokio::time::sleep(Duration::from_secs(10)).await;
    tx.shutdown();

    let a = assert_ok!(a.await.unwrap());
    let b = assert_ok!(b.await.unwrap());

    let mut seen = handler.started();
    seen.sort();
    assert_eq!(seen, vec!["one", "two"]);
    assert_eq!(a.reconnects, 0);
    assert_eq!(b.reconnects, 1);
}
