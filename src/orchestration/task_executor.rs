//! # Task Executor
//!
//! Runs a single task against its external action and always produces a
//! [`TaskOutcome`]. Invocation errors, timeouts and cancellation all end up as
//! an `error` outcome; nothing escapes to the caller.
//!
//! Concurrency is bounded by a semaphore shared by every job. A task waiting
//! for a slot when its job is cancelled is never dispatched and reports no
//! status. Once started, an action is polled with exponential back-off until
//! it reports `isFinished`.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::constants::{events, system};
use crate::events::EventPublisher;
use crate::logging::log_task_operation;
use crate::models::OrchestrationTask;
use crate::orchestration::types::{
    ActionError, ActionInvoker, ActionRequest, ActionResponse, TaskOutcome, TaskSlot,
};
use crate::registry::ActionRegistry;
use crate::state_machine::TaskResultStatus;

/// How an action run ended
#[derive(Debug)]
enum ActionRun {
    Finished(ActionResponse),
    Terminated,
    TimedOut(Duration),
    Failed(ActionError),
}

#[derive(Clone)]
pub struct TaskExecutor {
    actions: Arc<ActionRegistry>,
    config: Arc<EngineConfig>,
    event_publisher: EventPublisher,
    /// Worker slots shared by all jobs
    execution_semaphore: Arc<Semaphore>,
}

impl TaskExecutor {
    pub fn new(
        actions: Arc<ActionRegistry>,
        config: Arc<EngineConfig>,
        event_publisher: EventPublisher,
    ) -> Self {
        let execution_semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));

        Self {
            actions,
            config,
            event_publisher,
            execution_semaphore,
        }
    }

    pub fn available_slots(&self) -> usize {
        self.execution_semaphore.available_permits()
    }

    /// Execute one task. Inactive tasks and tasks cancelled before getting a
    /// worker slot are reported as not attempted.
    #[instrument(skip(self, task, cancel), fields(job_id = %slot.job_id, phase_index = slot.phase_index, task_id = ?task.id))]
    pub async fn execute(
        &self,
        slot: TaskSlot,
        task: OrchestrationTask,
        cancel: CancellationToken,
    ) -> TaskOutcome {
        if !task.active {
            debug!("Skipping inactive task");
            return TaskOutcome::not_attempted();
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Job cancelled before task was dispatched");
                return TaskOutcome::not_attempted();
            }
            permit = Arc::clone(&self.execution_semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    let now = Utc::now();
                    return TaskOutcome {
                        status: Some(TaskResultStatus::Error),
                        start_time: Some(now),
                        end_time: Some(now),
                        response: Some(json!({"error": format!("No worker slot available: {e}")})),
                    };
                }
            },
        };

        let start_time = Utc::now();
        self.event_publisher.publish(
            events::JOB_TASK_STARTED,
            json!({
                "job_id": slot.job_id,
                "task_id": task.id,
                "phase_index": slot.phase_index,
                "action": task.action.to_string(),
            }),
        );

        let request = ActionRequest::for_task(slot.job_id, &task);
        let timeout = self.config.task_timeout(task.timeout_minutes);
        let run = match self.actions.resolve(&task.action) {
            Ok(invoker) => self.run_action(invoker.as_ref(), &request, timeout, &cancel).await,
            Err(e) => ActionRun::Failed(e),
        };

        let (status, response) = match run {
            ActionRun::Finished(response) => (response.outcome(), response.to_value()),
            ActionRun::Terminated => (
                TaskResultStatus::Error,
                json!({"error": system::TERMINATED_ERROR}),
            ),
            ActionRun::TimedOut(limit) => (
                TaskResultStatus::Error,
                json!({
                    "error": system::TIMEOUT_ERROR,
                    "message": format!("Task did not finish within {} minutes", limit.as_secs() / 60),
                }),
            ),
            ActionRun::Failed(e) => {
                warn!(error = %e, "Task action failed");
                (TaskResultStatus::Error, json!({"error": e.to_string()}))
            }
        };

        let outcome = TaskOutcome {
            status: Some(status),
            start_time: Some(start_time),
            end_time: Some(Utc::now()),
            response: Some(response),
        };

        log_task_operation(
            "execute",
            slot.job_id,
            task.id,
            Some(slot.phase_index),
            &status.to_string(),
            None,
        );
        self.event_publisher.publish(
            events::JOB_TASK_COMPLETED,
            json!({
                "job_id": slot.job_id,
                "task_id": task.id,
                "phase_index": slot.phase_index,
                "status": status,
            }),
        );

        outcome
    }

    /// Run the action, bounded by the task timeout when there is one
    async fn run_action(
        &self,
        invoker: &dyn ActionInvoker,
        request: &ActionRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ActionRun {
        let Some(limit) = timeout else {
            let mut last = None;
            return self.drive(invoker, request, cancel, &mut last).await;
        };

        let mut last = None;
        let result = tokio::time::timeout(limit, self.drive(invoker, request, cancel, &mut last)).await;

        match result {
            Ok(run) => run,
            Err(_) => {
                warn!(timeout = ?limit, "Task execution timed out");
                if let Some(response) = last.as_ref().filter(|r| !r.is_finished) {
                    if let Err(e) = invoker.terminate(request, response).await {
                        debug!(error = %e, "Failed to terminate timed out action");
                    }
                }
                ActionRun::TimedOut(limit)
            }
        }
    }

    /// Start the action and poll it to completion. `last` always holds the
    /// most recent response so a timed-out run can still be terminated.
    async fn drive(
        &self,
        invoker: &dyn ActionInvoker,
        request: &ActionRequest,
        cancel: &CancellationToken,
        last: &mut Option<ActionResponse>,
    ) -> ActionRun {
        let mut response = match invoker.start(request).await {
            Ok(response) => response,
            Err(e) => return ActionRun::Failed(e),
        };
        *last = Some(response.clone());

        let mut attempt: u32 = 0;
        let mut termination_refused = false;

        while !response.is_finished {
            let delay = self.config.poll_delay(attempt);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = cancel.cancelled(), if !termination_refused => {
                    match invoker.terminate(request, &response).await {
                        Ok(true) => {
                            debug!("Action interrupted by cancellation");
                            return ActionRun::Terminated;
                        }
                        Ok(false) => {
                            debug!("Action is not interruptible, awaiting its completion");
                        }
                        Err(e) => {
                            warn!(error = %e, "Terminate request failed, awaiting completion");
                        }
                    }
                    termination_refused = true;
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            response = match invoker.poll(request, &response).await {
                Ok(response) => response,
                Err(e) => return ActionRun::Failed(e),
            };
            *last = Some(response.clone());
        }

        ActionRun::Finished(response)
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("max_concurrent_tasks", &self.config.max_concurrent_tasks)
            .field("available_slots", &self.available_slots())
            .finish()
    }
}
