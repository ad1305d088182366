//! # Phase Scheduler
//!
//! Fans the tasks of one phase out to the [`TaskExecutor`] and joins them.
//! The join is the phase barrier: `run_phase` resolves only after every
//! dispatched task has resolved, successfully or not.

use futures::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::models::OrchestrationTask;
use crate::orchestration::task_executor::TaskExecutor;
use crate::orchestration::types::{PhaseOutcome, TaskOutcome, TaskSlot};
use crate::state_machine::TaskResultStatus;

#[derive(Debug, Clone)]
pub struct PhaseScheduler {
    executor: TaskExecutor,
}

impl PhaseScheduler {
    pub fn new(executor: TaskExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    /// Run all tasks of a phase concurrently and wait for every one of them.
    ///
    /// `tasks` pairs each task with its position in the job's flat results.
    #[instrument(skip(self, tasks, cancel), fields(task_count = tasks.len()))]
    pub async fn run_phase(
        &self,
        job_id: Uuid,
        phase_index: usize,
        tasks: Vec<(usize, OrchestrationTask)>,
        cancel: &CancellationToken,
    ) -> PhaseOutcome {
        let handles: Vec<_> = tasks
            .iter()
            .map(|(flat_index, task)| {
                let executor = self.executor.clone();
                let task = task.clone();
                let cancel = cancel.clone();
                let slot = TaskSlot {
                    job_id,
                    phase_index,
                    flat_index: *flat_index,
                };

                tokio::spawn(async move { executor.execute(slot, task, cancel).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut outcome = PhaseOutcome {
            phase_index,
            ..Default::default()
        };

        for ((flat_index, task), joined) in tasks.into_iter().zip(joined) {
            let result = joined.unwrap_or_else(|e| {
                error!(error = %e, task_id = ?task.id, "Task execution panicked");
                TaskOutcome {
                    status: Some(TaskResultStatus::Error),
                    start_time: None,
                    end_time: Some(chrono::Utc::now()),
                    response: Some(json!({"error": format!("Task execution panicked: {e}")})),
                }
            });

            match result.status {
                None => outcome.skipped += 1,
                Some(TaskResultStatus::Success) => outcome.succeeded += 1,
                Some(TaskResultStatus::Error) if task.continue_on_failure => {
                    outcome.tolerated_failures += 1;
                }
                Some(TaskResultStatus::Error) => {
                    debug!(task_id = ?task.id, "Fatal task failure halts the run");
                    outcome.fatal_failure = true;
                }
            }

            outcome.outcomes.push((flat_index, result));
        }

        info!(
            succeeded = outcome.succeeded,
            tolerated_failures = outcome.tolerated_failures,
            fatal_failure = outcome.fatal_failure,
            skipped = outcome.skipped,
            "Phase completed"
        );

        outcome
    }
}
