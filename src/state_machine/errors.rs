use thiserror::Error;

/// Error types for job state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Job is already finished in state {state}")]
    AlreadyFinished { state: String },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
