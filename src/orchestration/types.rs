//! # Orchestration Types
//!
//! Types shared by the executor, scheduler and controller, and the
//! [`ActionInvoker`] seam through which external actions are run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ActionRef, JobId, OrchestrationTask, TaskId};
use crate::state_machine::TaskResultStatus;

/// One invocation of an external action on behalf of a job task
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub job_id: JobId,
    pub task_id: Option<TaskId>,
    pub action: ActionRef,
    pub parameters: Value,
}

impl ActionRequest {
    pub fn for_task(job_id: JobId, task: &OrchestrationTask) -> Self {
        Self {
            job_id,
            task_id: task.id,
            action: task.action.clone(),
            parameters: task.action_parameters.clone(),
        }
    }
}

/// State of an external action as reported by its component. Unknown
/// fields are kept so the task result carries the full response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: String,
    pub is_finished: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionResponse {
    pub fn running(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            status: "processing".to_string(),
            is_finished: false,
            extra: Map::new(),
        }
    }

    pub fn finished(status: impl Into<String>) -> Self {
        Self {
            id: None,
            status: status.into(),
            is_finished: true,
            extra: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Task outcome for a finished action
    pub fn outcome(&self) -> TaskResultStatus {
        self.status.parse().unwrap_or(TaskResultStatus::Error)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"status": self.status}))
    }
}

/// Failures raised by an [`ActionInvoker`]. They never leave the task
/// executor; each one becomes an `error` task result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("Unknown component: {0}")]
    UnknownComponent(String),
    #[error("Action invocation failed: {0}")]
    Invocation(String),
    #[error("Invalid action response: {0}")]
    Protocol(String),
}

/// Runs external actions. Implementations talk to whatever executes a
/// component; the engine only starts, polls and terminates.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Start the action; the response may already be finished
    async fn start(&self, request: &ActionRequest) -> Result<ActionResponse, ActionError>;

    /// Refresh the state of a started, unfinished action
    async fn poll(
        &self,
        request: &ActionRequest,
        response: &ActionResponse,
    ) -> Result<ActionResponse, ActionError>;

    /// Ask the action to stop. Returns whether it was actually interrupted;
    /// `false` means it keeps running to its natural end.
    async fn terminate(
        &self,
        request: &ActionRequest,
        response: &ActionResponse,
    ) -> Result<bool, ActionError>;
}

/// What the executor produced for one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// `None` when the task was never dispatched
    pub status: Option<TaskResultStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub response: Option<Value>,
}

impl TaskOutcome {
    pub fn not_attempted() -> Self {
        Self {
            status: None,
            start_time: None,
            end_time: None,
            response: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == Some(TaskResultStatus::Error)
    }
}

/// Identifies one task slot within a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSlot {
    pub job_id: Uuid,
    pub phase_index: usize,
    /// Position in the job's flat results list
    pub flat_index: usize,
}

/// Result of one phase after its barrier
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseOutcome {
    pub phase_index: usize,
    /// `(flat_index, outcome)` in within-phase submission order
    pub outcomes: Vec<(usize, TaskOutcome)>,
    /// A task without `continueOnFailure` failed
    pub fatal_failure: bool,
    pub tolerated_failures: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

impl PhaseOutcome {
    pub fn should_advance(&self) -> bool {
        !self.fatal_failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_outcome_mapping() {
        assert_eq!(ActionResponse::finished("success").outcome(), TaskResultStatus::Success);
        assert_eq!(ActionResponse::finished("ok").outcome(), TaskResultStatus::Success);
        assert_eq!(ActionResponse::finished("error").outcome(), TaskResultStatus::Error);
        assert_eq!(ActionResponse::finished("terminated").outcome(), TaskResultStatus::Error);
    }

    #[test]
    fn test_response_keeps_extra_fields() {
        let response: ActionResponse = serde_json::from_value(json!({
            "id": "123",
            "status": "success",
            "isFinished": true,
            "result": {"rows": 10}
        }))
        .unwrap();

        assert_eq!(response.extra["result"]["rows"], 10);
        let value = response.to_value();
        assert_eq!(value["isFinished"], true);
        assert_eq!(value["result"]["rows"], 10);
    }
}
