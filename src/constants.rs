//! # System Constants
//!
//! Lifecycle event names and operational limits of the orchestration engine.

/// Lifecycle events published through the [`crate::events::EventPublisher`]
pub mod events {
    // Job lifecycle events
    pub const JOB_CREATED: &str = "job.created";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_PHASE_STARTED: &str = "job.phase_started";
    pub const JOB_PHASE_COMPLETED: &str = "job.phase_completed";
    pub const JOB_TASK_STARTED: &str = "job.task_started";
    pub const JOB_TASK_COMPLETED: &str = "job.task_completed";
    pub const JOB_FINISHED: &str = "job.finished";
    pub const JOB_CANCEL_REQUESTED: &str = "job.cancel_requested";
    pub const JOB_NOTIFICATION_REQUESTED: &str = "job.notification_requested";

    // Orchestration definition events
    pub const ORCHESTRATION_CREATED: &str = "orchestration.created";
    pub const ORCHESTRATION_UPDATED: &str = "orchestration.updated";
    pub const ORCHESTRATION_DELETED: &str = "orchestration.deleted";
}

/// System-wide constants
pub mod system {
    pub const ORCHESTRATOR_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Upper bound on tasks in one orchestration
    pub const MAX_TASKS_PER_ORCHESTRATION: usize = 1000;

    /// Nesting limit for `actionParameters` documents
    pub const MAX_ACTION_PARAMETERS_DEPTH: usize = 32;

    /// Error payload recorded for an in-flight task aborted by cancellation
    pub const TERMINATED_ERROR: &str = "terminated";

    /// Error payload recorded when a task's timeout elapses
    pub const TIMEOUT_ERROR: &str = "timeout";
}
