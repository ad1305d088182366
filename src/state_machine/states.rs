use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created and queued, not yet picked up
    Waiting,
    /// Phases are being dispatched
    Processing,
    /// Every dispatched task succeeded
    Success,
    /// All phases ran but at least one tolerated failure occurred
    Warning,
    /// A fatal failure halted the run
    Error,
    /// Cancelled before processing began
    Cancelled,
    /// Cancellation requested mid-run, in-flight tasks being aborted
    Terminating,
    /// Cancellation of a running job completed
    Terminated,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Warning | Self::Error | Self::Cancelled | Self::Terminated
        )
    }

    /// Check if a cancellation request is still meaningful
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Waiting | Self::Processing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Processing => write!(f, "processing"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Terminating => write!(f, "terminating"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            "terminating" => Ok(Self::Terminating),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Waiting
    }
}

/// Outcome of one dispatched task. A task that was never attempted has no
/// status at all (`Option::None` at the use site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Success,
    Error,
}

impl fmt::Display for TaskResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TaskResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" | "ok" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid task result status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_finished_check() {
        assert!(JobState::Success.is_finished());
        assert!(JobState::Warning.is_finished());
        assert!(JobState::Error.is_finished());
        assert!(JobState::Cancelled.is_finished());
        assert!(JobState::Terminated.is_finished());
        assert!(!JobState::Waiting.is_finished());
        assert!(!JobState::Processing.is_finished());
        assert!(!JobState::Terminating.is_finished());
    }

    #[test]
    fn test_cancellable_states() {
        assert!(JobState::Waiting.is_cancellable());
        assert!(JobState::Processing.is_cancellable());
        assert!(!JobState::Terminating.is_cancellable());
        assert!(!JobState::Error.is_cancellable());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(JobState::Terminating.to_string(), "terminating");
        assert_eq!("warning".parse::<JobState>().unwrap(), JobState::Warning);
        assert!("warn".parse::<JobState>().is_err());

        assert_eq!(TaskResultStatus::Error.to_string(), "error");
        assert_eq!(
            "ok".parse::<TaskResultStatus>().unwrap(),
            TaskResultStatus::Success
        );
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&JobState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");

        let parsed: JobState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobState::Processing);
    }
}
