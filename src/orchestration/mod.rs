//! # Orchestration Engine
//!
//! Phase-based execution of orchestration task lists.
//!
//! ## Core Components
//!
//! - **PhaseGrouper**: partitions a task list into ordered phases
//! - **TaskExecutor**: runs one task against its external action, with
//!   polling, timeout and termination
//! - **PhaseScheduler**: runs a phase's tasks concurrently and joins them
//! - **JobController**: drives a job through its phases and picks the terminal state
//! - **OrchestrationRegistry**: versioned orchestration definitions and job snapshots
//! - **CronSchedule**: next run time for a `crontabRecord`
//! - **OrchestrationSystem**: the facade tying the above together
//!
//! ```text
//! OrchestrationSystem
//! ├── OrchestrationRegistry   (definitions, snapshots)
//! └── JobController           (one tokio task per job)
//!     └── PhaseScheduler      (phase barrier)
//!         └── TaskExecutor    (shared worker slots)
//!             └── ActionRegistry -> ActionInvoker
//! ```

pub mod job_controller;
pub mod orchestration_system;
pub mod phase_grouper;
pub mod phase_scheduler;
pub mod registry;
pub mod schedule;
pub mod task_executor;
pub mod types;

pub use job_controller::{notification_recipients, CancelOutcome, JobController, JobHandle};
pub use orchestration_system::OrchestrationSystem;
pub use phase_grouper::{execution_order, group_into_phases, phase_task_ids, Phase};
pub use phase_scheduler::PhaseScheduler;
pub use registry::{OrchestrationRegistry, OrchestrationSnapshot};
pub use schedule::{next_run_from_cron, CronSchedule};
pub use task_executor::TaskExecutor;
pub use types::{
    ActionError, ActionInvoker, ActionRequest, ActionResponse, PhaseOutcome, TaskOutcome,
    TaskSlot,
};
