//! Retask Worker - Main Entry Point
//!
//! Usage: `retask-worker [QUEUE]` (defaults to `worker.queue` from configuration)

mod handler;
mod settings;

use anyhow::{Context, Result};
use handler::PrintHandler;
use settings::{DaemonConfig, LogFormat, LoggingSection};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use retask_core::application::{shutdown_channel, Worker, WorkerStats};
use retask_core::domain::QueueName;
use retask_infra_redis::RedisQueueClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_FILE_PREFIX: &str = "retask-worker.log";
const CLIENT_NAME: &str = "retask-worker";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::load()?;

    // 2. Initialize logging (guards flush the non-blocking writers on exit)
    let _log_guards = init_logging(&config.logging)?;

    info!("Retask worker v{} starting...", VERSION);

    let queue_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.worker.queue.clone());
    let queue = QueueName::new(queue_name).context("Invalid queue name")?;

    // 3. Wire dependencies
    let mut redis = config.redis.clone();
    redis.client_name.get_or_insert_with(|| CLIENT_NAME.to_string());
    let client = RedisQueueClient::new(redis).with_reply_ttl(config.reply_ttl());
    let handler = Arc::new(PrintHandler::new(config.handler.echo_reply));

    let worker = Worker::new(
        queue.clone(),
        Box::new(client),
        handler,
        config.worker_config(),
    )
    .context("Invalid worker configuration")?;

    let mut states = worker.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            debug!(state = %*states.borrow_and_update(), "Worker state changed");
        }
    });

    // 4. Start worker
    info!(
        queue = %queue,
        redis = %config.redis.display_url(),
        "Starting worker (press Ctrl+C to shutdown)"
    );
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // 5. Wait for a shutdown signal or for the worker to stop on its own
    let finished = tokio::select! {
        joined = &mut worker_handle => Some(joined),
        _ = shutdown_signal() => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            info!("Shutdown signal received. Draining in-flight tasks...");
            shutdown_tx.shutdown();
            drain_or_abort(worker_handle).await
        }
    };

    match joined.context("Worker task panicked")? {
        Ok(stats) => {
            info!(
                received = stats.tasks_received,
                succeeded = stats.tasks_succeeded,
                failed = stats.tasks_failed,
                requeued = stats.tasks_requeued,
                reconnects = stats.reconnects,
                "Shutdown complete."
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, error_kind = %e.kind(), "Worker stopped");
            Err(e.into())
        }
    }
}

/// Wait for the worker to drain; a second signal gives up on it
async fn drain_or_abort(
    mut handle: JoinHandle<retask_core::Result<WorkerStats>>,
) -> std::result::Result<retask_core::Result<WorkerStats>, JoinError> {
    tokio::select! {
        joined = &mut handle => joined,
        _ = shutdown_signal() => {
            warn!("Second shutdown signal, abandoning in-flight tasks");
            handle.abort();
            handle.await
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Log to stdout, and also to daily-rotated files when a directory is set
///
/// The returned guards flush the non-blocking writers when dropped.
fn init_logging(logging: &LoggingSection) -> Result<Vec<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .context("Invalid log filter")?;

    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file, file_guard) = logging
        .directory
        .as_ref()
        .map(|dir| {
            let dir = shellexpand::tilde(dir).into_owned();
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        })
        .unzip();

    match logging.format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(stdout))
                .with(file.map(|w| fmt::layer().json().with_writer(w)))
                .try_init()
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting, no colors in files
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(stdout))
                .with(file.map(|w| fmt::layer().pretty().with_ansi(false).with_writer(w)))
                .try_init()
        }
    }
    .context("Failed to initialize logging")?;

    Ok(std::iter::once(stdout_guard).chain(file_guard).collect())
}
