//! Retask CLI - Command-line producer for Retask queues

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use retask_sdk::{Queue, RedisSettings};
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_QUEUE: &str = "default";

#[derive(Parser)]
#[command(name = "retask")]
#[command(about = "Retask queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Redis server URL
    #[arg(long, env = "RETASK_REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    redis_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Put a task on a queue
    Enqueue {
        /// Queue name
        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,

        /// Payload as JSON string
        #[arg(long)]
        payload: String,

        /// Wait up to this many seconds for the worker's result
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Number of tasks waiting on a queue
    Length {
        /// Queue name
        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,
    },

    /// List queues that currently hold tasks
    Names,
}

#[derive(Tabled)]
struct EnqueueRow {
    queue: String,
    urn: String,
}

#[derive(Tabled)]
struct QueueRow {
    name: String,
    length: u64,
}

async fn open(url: &str, queue: &str) -> Result<Queue> {
    let mut queue = Queue::new(queue, RedisSettings::from_url(url)).context("Invalid queue name")?;
    queue
        .connect()
        .await
        .context("Failed to connect to Redis")?;
    Ok(queue)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            queue,
            payload,
            wait,
        } => {
            let payload_json: serde_json::Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;

            let queue = open(&cli.redis_url, &queue).await?;
            let mut job = queue.enqueue(&payload_json).await?;

            println!("{}", "✓ Task enqueued successfully".green().bold());
            println!();

            let row = EnqueueRow {
                queue: queue.name().to_string(),
                urn: job.urn().to_string(),
            };
            println!("{}", Table::new(vec![row]));

            if let Some(secs) = wait {
                println!();
                println!(
                    "{}",
                    format!("Waiting up to {}s for a result...", secs).cyan()
                );

                if job.wait(Duration::from_secs(secs)).await? {
                    let result = job.result().await?.cloned().unwrap_or_default();
                    println!("  {} {}", "Result:".bold(), result);
                } else {
                    println!("  {}", "No result received".yellow());
                }
            }
        }

        Commands::Length { queue } => {
            let queue = open(&cli.redis_url, &queue).await?;
            let length = queue.length().await?;
            println!("  {} {}", format!("{}:", queue.name()).bold(), length);
        }

        Commands::Names => {
            let queue = open(&cli.redis_url, DEFAULT_QUEUE).await?;
            let names = queue.names().await?;

            if names.is_empty() {
                println!("{}", "No queues found".yellow());
                return Ok(());
            }

            let mut rows = Vec::with_capacity(names.len());
            for name in names {
                let length = match queue.with_name(name.clone()) {
                    Ok(other) => other.length().await?,
                    // Keys written by something else under our prefix
                    Err(_) => continue,
                };
                rows.push(QueueRow { name, length });
            }

            println!("{}", "Queues".cyan().bold());
            println!();
            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enqueue_with_wait() {
        let cli = Cli::try_parse_from([
            "retask",
            "enqueue",
            "--queue",
            "emails",
            "--payload",
            r#"{"to":"a@b"}"#,
            "--wait",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Enqueue { queue, wait, .. } => {
                assert_eq!(queue, "emails");
                assert_eq!(wait, Some(5));
            }
            _ => panic!("expected enqueue"),
        }
        assert_eq!(cli.redis_url, DEFAULT_REDIS_URL);
    }
}
