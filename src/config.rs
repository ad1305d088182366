use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "ORCHESTRATOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Task executions in flight at once, across all jobs
    pub max_concurrent_tasks: usize,
    /// Jobs in `processing` at once; further jobs stay `waiting`
    pub max_concurrent_jobs: usize,
    /// First delay between polls of an unfinished external action
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub poll_backoff_multiplier: f64,
    /// Upper bound applied to every task's own `timeoutMinutes`
    pub max_task_timeout_minutes: Option<u32>,
    pub event_channel_capacity: usize,
    pub max_action_parameters_bytes: usize,
    /// Jobs kept queryable; the oldest finished jobs are evicted past this
    pub max_retained_jobs: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            max_concurrent_jobs: 10,
            poll_interval_ms: 1000,
            max_poll_interval_ms: 20_000,
            poll_backoff_multiplier: 2.0,
            max_task_timeout_minutes: None,
            event_channel_capacity: 1000,
            max_action_parameters_bytes: 1024 * 1024,
            max_retained_jobs: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = env_var("MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid max_concurrent_tasks: {e}"))
            })?;
        }

        if let Some(value) = env_var("MAX_CONCURRENT_JOBS") {
            config.max_concurrent_jobs = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid max_concurrent_jobs: {e}"))
            })?;
        }

        if let Some(value) = env_var("POLL_INTERVAL_MS") {
            config.poll_interval_ms = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid poll_interval_ms: {e}"))
            })?;
        }

        if let Some(value) = env_var("MAX_POLL_INTERVAL_MS") {
            config.max_poll_interval_ms = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid max_poll_interval_ms: {e}"))
            })?;
        }

        if let Some(value) = env_var("POLL_BACKOFF_MULTIPLIER") {
            config.poll_backoff_multiplier = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!(
                    "Invalid poll_backoff_multiplier: {e}"
                ))
            })?;
        }

        if let Some(value) = env_var("MAX_TASK_TIMEOUT_MINUTES") {
            let minutes: u32 = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!(
                    "Invalid max_task_timeout_minutes: {e}"
                ))
            })?;
            config.max_task_timeout_minutes = (minutes > 0).then_some(minutes);
        }

        if let Some(value) = env_var("EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid event_channel_capacity: {e}"))
            })?;
        }

        if let Some(value) = env_var("MAX_ACTION_PARAMETERS_BYTES") {
            config.max_action_parameters_bytes = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!(
                    "Invalid max_action_parameters_bytes: {e}"
                ))
            })?;
        }

        if let Some(value) = env_var("MAX_RETAINED_JOBS") {
            config.max_retained_jobs = value.parse().map_err(|e| {
                OrchestratorError::ConfigurationError(format!("Invalid max_retained_jobs: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML/YAML/JSON file (format from the extension), then apply
    /// `ORCHESTRATOR_*` environment overrides on top of it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(OrchestratorError::ConfigurationError(format!(
                "max_poll_interval_ms ({}) is below poll_interval_ms ({})",
                self.max_poll_interval_ms, self.poll_interval_ms
            )));
        }
        if !(self.poll_backoff_multiplier >= 1.0) {
            return Err(OrchestratorError::ConfigurationError(format!(
                "poll_backoff_multiplier must be >= 1.0, got {}",
                self.poll_backoff_multiplier
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_action_parameters_bytes == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "max_action_parameters_bytes must be at least 1".to_string(),
            ));
        }
        if self.max_retained_jobs == 0 {
            return Err(OrchestratorError::ConfigurationError(
                "max_retained_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before poll number `attempt` (0-based), capped at the ceiling
    pub fn poll_delay(&self, attempt: u32) -> Duration {
        let factor = self.poll_backoff_multiplier.powi(attempt.min(64) as i32);
        let delay_ms = (self.poll_interval_ms as f64 * factor).min(self.max_poll_interval_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Effective timeout for a task, after applying the engine-wide cap. A
    /// zero cap means no cap.
    pub fn task_timeout(&self, timeout_minutes: Option<u32>) -> Option<Duration> {
        let cap = self.max_task_timeout_minutes.filter(|m| *m > 0);
        let minutes = match (timeout_minutes, cap) {
            (Some(task), Some(cap)) => Some(task.min(cap)),
            (Some(task), None) => Some(task),
            (None, cap) => cap,
        }?;
        Some(Duration::from_secs(u64::from(minutes) * 60))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{name}")).ok()
}
