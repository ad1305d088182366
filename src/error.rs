//! Error types for the orchestration engine.
//!
//! Only synchronous, caller-facing failures live here. Failures of individual
//! task executions never surface as an [`OrchestratorError`]; they are recorded
//! in the job's results by the task executor.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state_machine::errors::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("Orchestration {0} not found")]
    OrchestrationNotFound(Uuid),
    #[error("Job {0} not found")]
    JobNotFound(Uuid),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid task at position {index}: {reason}")]
    InvalidTask { index: usize, reason: String },
    /// Run-time task overrides conflict with the stored orchestration tasks
    #[error("{message}")]
    JobValidation { message: String },
    #[error("State transition error: {0}")]
    StateTransitionError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl OrchestratorError {
    /// Machine-readable error code exposed to API clients
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OrchestrationNotFound(_) | Self::JobNotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) | Self::InvalidTask { .. } => "VALIDATION",
            Self::JobValidation { .. } => "JOB_VALIDATION",
            Self::StateTransitionError(_) => "STATE_TRANSITION",
            Self::ConfigurationError(_) => "CONFIGURATION",
        }
    }

    /// HTTP status class the transport layer reports for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::OrchestrationNotFound(_) | Self::JobNotFound(_) => 404,
            Self::ValidationError(_) | Self::InvalidTask { .. } | Self::JobValidation { .. } => {
                400
            }
            Self::StateTransitionError(_) => 409,
            Self::ConfigurationError(_) => 500,
        }
    }

    /// Whether the caller caused the failure (4xx semantics)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }

    pub fn to_response(&self) -> ErrorResponse {
        let status = match self {
            Self::JobValidation { .. } => "warning",
            _ => "error",
        };

        ErrorResponse {
            message: self.to_string(),
            code: self.error_code().to_string(),
            status: status.to_string(),
        }
    }
}

impl From<StateMachineError> for OrchestratorError {
    fn from(error: StateMachineError) -> Self {
        OrchestratorError::StateTransitionError(error.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(error: serde_json::Error) -> Self {
        OrchestratorError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<::config::ConfigError> for OrchestratorError {
    fn from(error: ::config::ConfigError) -> Self {
        OrchestratorError::ConfigurationError(error.to_string())
    }
}

/// Serialisable error body, shaped like the remote API's error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
    pub status: String,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
