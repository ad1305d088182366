#![allow(clippy::doc_markdown)] // Allow technical terms like componentUrl, crontabRecord in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orchestrator Core Rust
//!
//! Phase-based task scheduler and job state machine for orchestrations.
//!
//! ## Overview
//!
//! An **orchestration** is a named, versioned list of tasks. Each task invokes
//! one external component action. Running an orchestration creates a **job**
//! that snapshots the task list, groups it into **phases**, runs the tasks of
//! a phase concurrently and the phases strictly one after another, and ends
//! in one of `success`, `warning`, `error`, `cancelled` or `terminated`.
//!
//! ## Key Features
//!
//! - **Phase barriers**: a phase starts only after every task of the previous
//!   phase has finished
//! - **Failure policy per task**: `continueOnFailure` degrades a run to
//!   `warning`, anything else halts later phases with `error`
//! - **Snapshot isolation**: editing an orchestration never touches jobs
//!   already created from it
//! - **Cooperative cancellation**: waiting jobs are cancelled outright,
//!   running jobs terminate their in-flight phase
//! - **Bounded execution**: one shared pool of worker slots for task
//!   executions, a second one for running jobs
//!
//! ## Module Organization
//!
//! - [`models`] - Tasks, orchestrations, jobs and results
//! - [`state_machine`] - Job lifecycle states and transitions
//! - [`orchestration`] - Phase grouping, execution and the public facade
//! - [`registry`] - Action routing to external invokers
//! - [`events`] - Lifecycle event publishing
//! - [`config`] - Engine configuration
//! - [`error`] - Structured error handling
//! - [`validation`] - Task list and run override validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orchestrator_core::config::EngineConfig;
//! use orchestrator_core::models::{CreateOrchestrationOptions, OrchestrationTask};
//! use orchestrator_core::orchestration::OrchestrationSystem;
//! use orchestrator_core::registry::ActionRegistry;
//! use orchestrator_core::test_helpers::SimulatedActionInvoker;
//! use std::sync::Arc;
//!
//! # async fn example() -> orchestrator_core::Result<()> {
//! let actions = Arc::new(ActionRegistry::new());
//! actions.register_component("keboola.ex-db-snowflake", Arc::new(SimulatedActionInvoker::new()));
//!
//! let system = OrchestrationSystem::new(EngineConfig::from_env()?, actions)?;
//! let orchestration = system.create_orchestration(
//!     "nightly load",
//!     CreateOrchestrationOptions {
//!         tasks: vec![
//!             OrchestrationTask::component("keboola.ex-db-snowflake", "run").with_phase("extract"),
//!             OrchestrationTask::component("keboola.ex-db-snowflake", "run").with_phase("extract"),
//!         ],
//!         ..Default::default()
//!     },
//! )?;
//!
//! let job = system.create_job(orchestration.id, vec![]).await?;
//! let finished = system.wait_for_job(job.id).await?;
//! println!("job {} finished with {}", finished.id, finished.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! cargo bench --features benchmarks
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod test_helpers;
pub mod validation;

pub use config::EngineConfig;
pub use constants::system;
pub use error::{ErrorResponse, OrchestratorError, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use models::{
    ActionRef, Job, JobId, JobResults, Notification, NotificationChannel, Orchestration,
    OrchestrationId, OrchestrationTask, PhaseKey, TaskId, TaskResult,
};
pub use orchestration::{
    ActionError, ActionInvoker, ActionRequest, ActionResponse, CancelOutcome, OrchestrationSystem,
};
pub use registry::ActionRegistry;
pub use state_machine::{JobEvent, JobState, StateMachineError, TaskResultStatus};
