pub mod job;
pub mod orchestration;
pub mod task;

// Re-export core models for easy access
pub use job::{Job, JobId, JobResults, TaskResult};
pub use orchestration::{
    CreateOrchestrationOptions, Notification, NotificationChannel, Orchestration,
    OrchestrationId, UpdateOrchestrationOptions,
};
pub use task::{ActionRef, OrchestrationTask, PhaseKey, TaskId};
