use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::broker::ActionType;
use crate::error::AppError;
use crate::runner::RetryPolicy;

pub const REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/bombfork/data-breaker-registry/main/dbp-brokers.json";

pub fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("", "bombfork", "dbp-scheduler")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

pub fn db_path() -> anyhow::Result<PathBuf> {
    let dirs = project_dirs()?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("dbp-scheduler.db"))
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Timeouts and delays used by the execution units and the action runner.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub scan_job_timeout: Duration,
    pub opt_out_job_timeout: Duration,
    /// Pause between two jobs of the same broker.
    pub interval_between_same_broker_jobs: Duration,
    /// Settle time before each action.
    pub action_await_time: Duration,
    pub max_concurrent_brokers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            scan_job_timeout: Duration::from_secs(30 * 60),
            opt_out_job_timeout: Duration::from_secs(30 * 60),
            interval_between_same_broker_jobs: Duration::from_secs(2),
            action_await_time: Duration::from_secs(3),
            max_concurrent_brokers: 2,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    registry_url: Option<String>,
    execution: ExecutionSection,
    retries: RetriesSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExecutionSection {
    scan_job_timeout_secs: u64,
    opt_out_job_timeout_secs: u64,
    interval_between_same_broker_jobs_secs: u64,
    action_await_time_ms: u64,
    max_concurrent_brokers: usize,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        let defaults = ExecutionConfig::default();
        Self {
            scan_job_timeout_secs: defaults.scan_job_timeout.as_secs(),
            opt_out_job_timeout_secs: defaults.opt_out_job_timeout.as_secs(),
            interval_between_same_broker_jobs_secs: defaults
                .interval_between_same_broker_jobs
                .as_secs(),
            action_await_time_ms: defaults.action_await_time.as_millis() as u64,
            max_concurrent_brokers: defaults.max_concurrent_brokers,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RetriesSection {
    default: Option<u32>,
    #[serde(flatten)]
    per_action_type: HashMap<ActionType, u32>,
}

/// Everything read from `config.toml`, with defaults for anything missing.
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry_url: String,
    pub execution: ExecutionConfig,
    pub retry_policy: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_url: REGISTRY_URL.to_string(),
            execution: ExecutionConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        let file: SettingsFile = toml::from_str(raw)?;
        let exec = file.execution;

        if exec.max_concurrent_brokers == 0 {
            return Err(AppError::Config(
                "execution.max_concurrent_brokers must be at least 1".into(),
            ));
        }

        let mut retry_policy = RetryPolicy::default();
        if let Some(default) = file.retries.default {
            retry_policy.default = default;
        }
        retry_policy
            .per_action_type
            .extend(file.retries.per_action_type);

        Ok(Self {
            registry_url: file
                .registry_url
                .unwrap_or_else(|| REGISTRY_URL.to_string()),
            execution: ExecutionConfig {
                scan_job_timeout: Duration::from_secs(exec.scan_job_timeout_secs),
                opt_out_job_timeout: Duration::from_secs(exec.opt_out_job_timeout_secs),
                interval_between_same_broker_jobs: Duration::from_secs(
                    exec.interval_between_same_broker_jobs_secs,
                ),
                action_await_time: Duration::from_millis(exec.action_await_time_ms),
                max_concurrent_brokers: exec.max_concurrent_brokers,
            },
            retry_policy,
        })
    }
}
