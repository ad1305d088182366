use serde::{Deserialize, Serialize};

/// Events that can trigger job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// The engine picked the job up and begins phase 0
    Start,
    /// Every dispatched task succeeded
    Succeed,
    /// All phases ran, some failures were tolerated
    CompleteWithWarnings,
    /// A fatal task failure halted the run
    Fail(String),
    /// User requested cancellation
    Cancel,
    /// In-flight work of a cancelled job has drained
    Terminated,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::CompleteWithWarnings => "complete_with_warnings",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Terminated => "terminated",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
