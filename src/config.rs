use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{olog_debug, Error, Result};

/// Default token budget for a full run (~$6 at current pricing).
pub const DEFAULT_MAX_TOKEN_BUDGET: i64 = 2_000_000;
/// Default number of retries before a task is blocked.
pub const DEFAULT_MAX_TASK_RETRIES: u32 = 3;
/// Default number of blocked tasks that triggers human escalation.
pub const DEFAULT_MAX_BLOCKED_TASKS: u32 = 3;
/// Default checkpoint cadence, in completed tasks.
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 10;
/// Default per-task capability timeout (10 minutes).
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;
/// Default number of worker agents registered at startup.
pub const DEFAULT_NUM_WORKERS: u32 = 3;

/// Runtime configuration for the orchestrator.
///
/// Loaded from `overseer.toml` in the data directory with compiled-in
/// defaults; CLI flags override individual fields after load. All limits
/// are injected explicitly into the circuit breaker and coordinator, never
/// read as ambient process state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cumulative token budget across all agents before a forced halt.
    pub max_token_budget: i64,
    /// Retries allowed per task before it is blocked.
    pub max_task_retries: u32,
    /// Blocked-task count that escalates to a human.
    pub max_blocked_tasks: u32,
    /// Write a checkpoint every N completed tasks.
    pub checkpoint_interval: u32,
    /// Wall-clock timeout for a single worker or reviewer invocation.
    pub task_timeout_secs: u64,
    /// Number of worker agents registered at startup.
    pub num_workers: u32,
    /// Command spawned to perform a unit of work.
    pub worker_command: String,
    /// Command spawned to review a completed unit of work.
    pub reviewer_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_token_budget: DEFAULT_MAX_TOKEN_BUDGET,
            max_task_retries: DEFAULT_MAX_TASK_RETRIES,
            max_blocked_tasks: DEFAULT_MAX_BLOCKED_TASKS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            num_workers: DEFAULT_NUM_WORKERS,
            worker_command: "overseer-worker".to_string(),
            reviewer_command: "overseer-reviewer".to_string(),
        }
    }
}

impl Config {
    /// Default data directory: `~/.overseer`.
    pub fn default_data_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".overseer"))
    }

    pub fn config_path(data_dir: &Path) -> PathBuf {
        data_dir.join("overseer.toml")
    }

    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join("state.db")
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Load configuration from the data directory, falling back to defaults
    /// when no config file exists.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::config_path(data_dir);
        olog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            olog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        config.validate()?;
        olog_debug!(
            "Config loaded: budget={}, retries={}, workers={}",
            config.max_token_budget,
            config.max_task_retries,
            config.num_workers
        );
        Ok(config)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir)?;
        }
        let path = Self::config_path(data_dir);
        fs::write(&path, toml::to_string_pretty(self)?)?;
        olog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.max_token_budget <= 0 {
            return Err(Error::Validation(
                "max_token_budget must be positive".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::Validation(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(Error::Validation(
                "num_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
