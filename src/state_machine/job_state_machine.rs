use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::JobEvent,
    states::JobState,
};

/// One applied transition, kept for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTransition {
    pub from_state: JobState,
    pub to_state: JobState,
    pub event: String,
    pub error_message: Option<String>,
    pub transitioned_at: DateTime<Utc>,
}

/// State machine for one job's lifecycle
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    job_id: Uuid,
    state: JobState,
    transitions: Vec<JobTransition>,
}

impl JobStateMachine {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            state: JobState::default(),
            transitions: Vec::new(),
        }
    }

    pub fn current_state(&self) -> JobState {
        self.state
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn transitions(&self) -> &[JobTransition] {
        &self.transitions
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Attempt to transition the job state
    pub fn transition(&mut self, event: JobEvent) -> StateMachineResult<JobState> {
        let current_state = self.state;
        let target_state = Self::determine_target_state(current_state, &event)?;

        debug!(
            job_id = %self.job_id,
            from = %current_state,
            to = %target_state,
            event = event.event_type(),
            "Job state transition"
        );

        self.transitions.push(JobTransition {
            from_state: current_state,
            to_state: target_state,
            event: event.event_type().to_string(),
            error_message: event.error_message().map(str::to_string),
            transitioned_at: Utc::now(),
        });
        self.state = target_state;

        Ok(target_state)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: JobState,
        event: &JobEvent,
    ) -> StateMachineResult<JobState> {
        if current_state.is_finished() {
            return Err(StateMachineError::AlreadyFinished {
                state: current_state.to_string(),
            });
        }

        let target = match (current_state, event) {
            (JobState::Waiting, JobEvent::Start) => JobState::Processing,

            (JobState::Processing, JobEvent::Succeed) => JobState::Success,
            (JobState::Processing, JobEvent::CompleteWithWarnings) => JobState::Warning,
            (JobState::Processing, JobEvent::Fail(_)) => JobState::Error,
            (JobState::Waiting, JobEvent::Fail(_)) => JobState::Error,

            (JobState::Waiting, JobEvent::Cancel) => JobState::Cancelled,
            (JobState::Processing, JobEvent::Cancel) => JobState::Terminating,
            (JobState::Terminating, JobEvent::Cancel) => JobState::Terminating,
            (JobState::Terminating, JobEvent::Terminated) => JobState::Terminated,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
