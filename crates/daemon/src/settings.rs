//! Worker daemon settings
//!
//! Layering (later wins):
//! 1. built-in defaults
//! 2. TOML file at `$RETASK_CONFIG`, else `<config dir>/retask/retask.toml` (optional)
//! 3. environment variables `RETASK__<SECTION>__<KEY>`, e.g. `RETASK__REDIS__HOST`

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use retask_core::application::{BackoffPolicy, FailurePolicy, WorkerConfig};
use retask_core::application::worker::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_BACKOFF_JITTER, DEFAULT_IDLE_DELAY,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_REQUEUES, DEFAULT_POLL_WAIT,
};
use retask_infra_redis::{RedisSettings, DEFAULT_REPLY_TTL};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "RETASK_CONFIG";
const ENV_PREFIX: &str = "RETASK";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_QUEUE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub redis: RedisSettings,
    pub worker: WorkerSection,
    pub backoff: BackoffSection,
    pub failure: FailureSection,
    pub handler: HandlerSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub queue: String,
    pub poll_wait_ms: u64,
    pub idle_delay_ms: u64,
    pub max_in_flight: usize,
    pub reply_ttl_secs: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            poll_wait_ms: DEFAULT_POLL_WAIT.as_millis() as u64,
            idle_delay_ms: DEFAULT_IDLE_DELAY.as_millis() as u64,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            reply_ttl_secs: DEFAULT_REPLY_TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSection {
    pub base_ms: u64,
    pub cap_ms: u64,
    /// Unset: retry forever
    pub max_attempts: Option<u32>,
    pub jitter: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BACKOFF_BASE.as_millis() as u64,
            cap_ms: DEFAULT_BACKOFF_CAP.as_millis() as u64,
            max_attempts: None,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    Drop,
    Requeue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureSection {
    pub policy: FailureMode,
    pub max_requeues: u32,
}

impl Default for FailureSection {
    fn default() -> Self {
        Self {
            policy: FailureMode::Drop,
            max_requeues: DEFAULT_MAX_REQUEUES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerSection {
    /// Send the decoded payload back to the producer as the task result
    pub echo_reply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    pub filter: String,
    /// Also write daily-rotated log files here (stdout logging stays on)
    pub directory: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "retask=info".to_string(),
            directory: None,
        }
    }
}

impl DaemonConfig {
    /// Load from the config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        let path = config_path();
        let file = path
            .as_ref()
            .map(|p| File::from(p.as_path()).required(false));
        Self::build(file, Environment::with_prefix(ENV_PREFIX))
            .with_context(|| match &path {
                Some(p) => format!("Failed to load configuration ({})", p.display()),
                None => "Failed to load configuration".to_string(),
            })
    }

    /// Load from TOML text plus explicit environment pairs
    pub fn from_toml(toml: &str, env: &[(&str, &str)]) -> Result<Self> {
        let vars = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::build(
            Some(File::from_str(toml, FileFormat::Toml)),
            Environment::with_prefix(ENV_PREFIX).source(Some(vars)),
        )
    }

    fn build<F>(file: Option<F>, env: Environment) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        let config = builder
            .add_source(
                env.prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        let mut backoff = BackoffPolicy::new(
            Duration::from_millis(self.backoff.base_ms),
            Duration::from_millis(self.backoff.cap_ms),
        )
        .with_jitter(self.backoff.jitter);
        if let Some(max) = self.backoff.max_attempts {
            backoff = backoff.with_max_attempts(max);
        }

        let failure_policy = match self.failure.policy {
            FailureMode::Drop => FailurePolicy::Drop,
            FailureMode::Requeue => FailurePolicy::Requeue {
                max_requeues: self.failure.max_requeues,
            },
        };

        WorkerConfig {
            poll_wait: Duration::from_millis(self.worker.poll_wait_ms),
            idle_delay: Duration::from_millis(self.worker.idle_delay_ms),
            backoff,
            failure_policy,
            max_in_flight: self.worker.max_in_flight,
        }
    }

    pub fn reply_ttl(&self) -> Duration {
        Duration::from_secs(self.worker.reply_ttl_secs)
    }
}

/// `$RETASK_CONFIG` (with `~` expanded), else the platform config dir
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(shellexpand::tilde(&path).into_owned()));
    }
    directories::ProjectDirs::from("", "", "retask").map(|dirs| dirs.config_dir().join("retask.toml"))
}
