//! # Job Controller
//!
//! Owns one job's lifecycle from `waiting` to its terminal state.
//!
//! ## Flow
//!
//! ```text
//! waiting --(job slot acquired)--> processing
//!   for each phase, in order:
//!     cancelled?            -> stop dispatching
//!     run_phase (barrier)   -> record outcomes
//!     fatal failure?        -> stop dispatching
//! finalize: terminating -> terminated
//!           fatal failure -> error
//!           tolerated     -> warning
//!           otherwise     -> success
//! ```
//!
//! A [`JobHandle`] is the shared, observable side of a job: the live resource,
//! its state machine, the cancellation token and a watch channel that
//! resolves waiters once the job is finished.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::constants::events;
use crate::events::EventPublisher;
use crate::logging::log_job_operation;
use crate::models::{
    Job, JobId, JobResults, Notification, NotificationChannel, OrchestrationId,
    OrchestrationTask, TaskResult,
};
use crate::orchestration::phase_grouper::{group_into_phases, phase_task_ids, Phase};
use crate::orchestration::phase_scheduler::PhaseScheduler;
use crate::orchestration::types::PhaseOutcome;
use crate::state_machine::{
    JobEvent, JobState, JobStateMachine, JobTransition, StateMachineResult, TaskResultStatus,
};

/// What a cancellation request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now `cancelled`
    Cancelled,
    /// The job was running and is now `terminating`
    Terminating,
    /// Cancellation was already in progress
    AlreadyRequested,
    /// The job had already finished in the given state
    AlreadyFinished(JobState),
}

struct JobRecord {
    job: Job,
    machine: JobStateMachine,
}

impl JobRecord {
    fn apply(&mut self, event: JobEvent) -> StateMachineResult<JobState> {
        let state = self.machine.transition(event)?;
        self.job.set_status(state);
        Ok(state)
    }
}

pub struct JobHandle {
    id: JobId,
    orchestration_id: OrchestrationId,
    /// Creation order across all jobs of the engine
    sequence: u64,
    record: RwLock<JobRecord>,
    phases: Vec<Phase>,
    /// Orchestration notifications as they were when the job was created
    notifications: Vec<Notification>,
    cancel: CancellationToken,
    status_tx: watch::Sender<JobState>,
}

impl JobHandle {
    /// Wrap a freshly created job, laying out its result skeleton from the
    /// phase plan of its task snapshot
    pub fn new(mut job: Job, notifications: Vec<Notification>, sequence: u64) -> Self {
        let phases = group_into_phases(&job.tasks);
        job.results = JobResults::from_phases(
            phases
                .iter()
                .map(|phase| {
                    phase
                        .task_indices
                        .iter()
                        .map(|&index| TaskResult::pending(job.tasks[index].clone()))
                        .collect()
                })
                .collect(),
        );

        let (status_tx, _) = watch::channel(job.status);

        Self {
            id: job.id,
            orchestration_id: job.orchestration_id,
            sequence,
            record: RwLock::new(JobRecord {
                machine: JobStateMachine::new(job.id),
                job,
            }),
            phases,
            notifications,
            cancel: CancellationToken::new(),
            status_tx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn orchestration_id(&self) -> OrchestrationId {
        self.orchestration_id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> JobState {
        self.record.read().machine.current_state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Point-in-time copy of the job resource
    pub fn snapshot(&self) -> Job {
        self.record.read().job.clone()
    }

    pub fn transitions(&self) -> Vec<JobTransition> {
        self.record.read().machine.transitions().to_vec()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.status_tx.subscribe()
    }

    /// Resolve once the job is finished and return its final resource
    pub async fn wait_until_finished(&self) -> Job {
        let mut receiver = self.status_tx.subscribe();
        // The sender lives as long as the handle, so this cannot fail while we hold &self
        if receiver.wait_for(JobState::is_finished).await.is_err() {
            debug!(job_id = %self.id, "Status channel closed while waiting");
        }
        self.snapshot()
    }

    /// Request cancellation. Idempotent: repeated or late requests report
    /// what already happened and change nothing.
    pub fn request_cancel(&self) -> StateMachineResult<CancelOutcome> {
        let outcome = {
            let mut record = self.record.write();
            let state = record.machine.current_state();
            if state.is_finished() {
                return Ok(CancelOutcome::AlreadyFinished(state));
            }
            if !state.is_cancellable() {
                return Ok(CancelOutcome::AlreadyRequested);
            }

            if record.apply(JobEvent::Cancel)? == JobState::Cancelled {
                record.job.end_time = Some(Utc::now());
                CancelOutcome::Cancelled
            } else {
                CancelOutcome::Terminating
            }
        };

        self.cancel.cancel();
        self.broadcast_status();
        Ok(outcome)
    }

    /// Push the current state to waiters. The state is read while the channel
    /// is locked, so concurrent broadcasts can never publish an older state
    /// after a newer one.
    fn broadcast_status(&self) {
        self.status_tx.send_if_modified(|published| {
            let state = self.state();
            if *published == state {
                return false;
            }
            *published = state;
            true
        });
    }

    fn phase_tasks(&self, phase_index: usize) -> Vec<(usize, OrchestrationTask)> {
        let record = self.record.read();
        let Some(phase) = self.phases.get(phase_index) else {
            return Vec::new();
        };

        phase
            .task_indices
            .iter()
            .enumerate()
            .filter_map(|(position, &task_index)| {
                let flat_index = record.job.results.flat_index(phase_index, position)?;
                record
                    .job
                    .tasks
                    .get(task_index)
                    .map(|task| (flat_index, task.clone()))
            })
            .collect()
    }

    fn record_phase(&self, outcome: &PhaseOutcome) {
        let mut record = self.record.write();
        for (flat_index, task_outcome) in &outcome.outcomes {
            record.job.results.record(*flat_index, |result| {
                result.status = task_outcome.status;
                result.start_time = task_outcome.start_time;
                result.end_time = task_outcome.end_time;
                result.response = task_outcome.response.clone();
            });
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("orchestration_id", &self.orchestration_id)
            .field("state", &self.state())
            .field("phases", &self.phases.len())
            .finish()
    }
}

/// Recipients for a finished job: orchestration notifications whose channel
/// matches the outcome, followed by the job's own addresses. Only `error`
/// and `warning` outcomes notify.
pub fn notification_recipients(
    status: JobState,
    notifications: &[Notification],
    job_emails: &[String],
) -> Vec<String> {
    let channels: &[NotificationChannel] = match status {
        JobState::Error => &[NotificationChannel::Error],
        JobState::Warning => &[NotificationChannel::Warning, NotificationChannel::Error],
        _ => return Vec::new(),
    };

    let mut recipients: Vec<String> = Vec::new();
    let matching = notifications
        .iter()
        .filter(|n| channels.contains(&n.channel))
        .map(|n| &n.email);

    for email in matching.chain(job_emails) {
        if !recipients.contains(email) {
            recipients.push(email.clone());
        }
    }

    recipients
}

/// Drives jobs through their phases
#[derive(Debug)]
pub struct JobController {
    scheduler: PhaseScheduler,
    event_publisher: EventPublisher,
    /// Jobs allowed in `processing` at once; the rest stay `waiting`
    job_slots: Arc<Semaphore>,
}

impl JobController {
    pub fn new(
        scheduler: PhaseScheduler,
        event_publisher: EventPublisher,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            scheduler,
            event_publisher,
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
        }
    }

    /// Run a job to completion and return its terminal state. A job
    /// cancelled while waiting returns without dispatching anything.
    #[instrument(skip(self, handle), fields(job_id = %handle.id(), orchestration_id = %handle.orchestration_id()))]
    pub async fn run(&self, handle: Arc<JobHandle>) -> JobState {
        let _job_slot = tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => {
                debug!("Job cancelled while waiting for a slot");
                handle.broadcast_status();
                return handle.state();
            }
            permit = Arc::clone(&self.job_slots).acquire_owned() => permit.ok(),
        };

        if !self.start(&handle) {
            handle.broadcast_status();
            return handle.state();
        }

        let mut fatal_failure = false;
        let mut tolerated_failures = 0;

        for (phase_index, phase) in handle.phases.iter().enumerate() {
            if handle.cancel.is_cancelled() {
                info!(phase_index, "Cancellation observed, no further phases dispatched");
                break;
            }

            let tasks = handle.phase_tasks(phase_index);
            self.event_publisher.publish(
                events::JOB_PHASE_STARTED,
                json!({
                    "job_id": handle.id,
                    "phase_index": phase_index,
                    "phase": phase.name(),
                    "task_count": tasks.len(),
                }),
            );

            let outcome = self
                .scheduler
                .run_phase(handle.id, phase_index, tasks, &handle.cancel)
                .await;
            handle.record_phase(&outcome);

            fatal_failure |= outcome.fatal_failure;
            tolerated_failures += outcome.tolerated_failures;

            self.event_publisher.publish(
                events::JOB_PHASE_COMPLETED,
                json!({
                    "job_id": handle.id,
                    "phase_index": phase_index,
                    "succeeded": outcome.succeeded,
                    "tolerated_failures": outcome.tolerated_failures,
                    "fatal_failure": outcome.fatal_failure,
                }),
            );

            if !outcome.should_advance() {
                info!(phase_index, "Fatal task failure, remaining phases are not dispatched");
                break;
            }
        }

        self.finalize(&handle, fatal_failure, tolerated_failures)
    }

    fn start(&self, handle: &JobHandle) -> bool {
        let (state, phase_tasks) = {
            let mut record = handle.record.write();
            match record.apply(JobEvent::Start) {
                Ok(state) => {
                    record.job.start_time = Some(Utc::now());
                    (state, phase_task_ids(&record.job.tasks, &handle.phases))
                }
                Err(e) => {
                    debug!(error = %e, "Job is no longer startable");
                    return false;
                }
            }
        };

        log_job_operation(
            "start",
            handle.id,
            Some(handle.orchestration_id),
            &state.to_string(),
            None,
        );
        self.event_publisher.publish(
            events::JOB_STARTED,
            json!({
                "job_id": handle.id,
                "orchestration_id": handle.orchestration_id,
                "phase_count": handle.phases.len(),
                "phases": phase_tasks,
            }),
        );
        handle.broadcast_status();
        true
    }

    /// Choose the terminal state. Cancellation wins over failure, and any
    /// fatal failure wins over tolerated ones.
    fn finalize(&self, handle: &JobHandle, fatal_failure: bool, tolerated_failures: usize) -> JobState {
        let state = {
            let mut record = handle.record.write();
            let event = if record.machine.current_state() == JobState::Terminating {
                JobEvent::Terminated
            } else if fatal_failure {
                JobEvent::fail_with_error("A task without continueOnFailure failed")
            } else if tolerated_failures > 0 {
                JobEvent::CompleteWithWarnings
            } else {
                JobEvent::Succeed
            };

            match record.apply(event) {
                Ok(state) => {
                    record.job.end_time = Some(Utc::now());
                    state
                }
                Err(e) => {
                    error!(error = %e, "Failed to finalize job");
                    return record.machine.current_state();
                }
            }
        };

        self.publish_finished(handle);
        handle.broadcast_status();
        state
    }

    /// Emit the finish event and, for failing outcomes, the notification
    /// request. Delivery of notifications is left to subscribers.
    pub fn publish_finished(&self, handle: &JobHandle) {
        let job = handle.snapshot();
        let results = &job.results;

        log_job_operation(
            "finish",
            job.id,
            Some(job.orchestration_id),
            &job.status.to_string(),
            None,
        );
        self.event_publisher.publish(
            events::JOB_FINISHED,
            json!({
                "job_id": job.id,
                "orchestration_id": job.orchestration_id,
                "status": job.status,
                "succeeded": results.count_status(TaskResultStatus::Success),
                "failed": results.count_status(TaskResultStatus::Error),
                "not_attempted": results.not_attempted(),
            }),
        );

        let recipients =
            notification_recipients(job.status, &handle.notifications, &job.notifications_emails);
        if !recipients.is_empty() {
            self.event_publisher.publish(
                events::JOB_NOTIFICATION_REQUESTED,
                json!({
                    "job_id": job.id,
                    "orchestration_id": job.orchestration_id,
                    "status": job.status,
                    "recipients": recipients,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::orchestration::task_executor::TaskExecutor;
    use crate::registry::ActionRegistry;
    use crate::test_helpers::SimulatedActionInvoker;
    use serde_json::Value;
    use std::time::Duration;
    use uuid::Uuid;

    fn controller(invoker: Arc<SimulatedActionInvoker>) -> JobController {
        let actions = Arc::new(ActionRegistry::new());
        actions.register_component("sim", invoker);
        let config = Arc::new(EngineConfig {
            poll_interval_ms: 5,
            max_poll_interval_ms: 10,
            ..Default::default()
        });
        let publisher = EventPublisher::new(64);
        let executor = TaskExecutor::new(actions, config, publisher.clone());
        JobController::new(PhaseScheduler::new(executor), publisher, 4)
    }

    fn sim(parameters: Value) -> OrchestrationTask {
        OrchestrationTask::component("sim", "run")
            .with_id(Uuid::new_v4())
            .with_action_parameters(parameters)
    }

    fn handle(tasks: Vec<OrchestrationTask>) -> Arc<JobHandle> {
        Arc::new(JobHandle::new(
            Job::new(Uuid::new_v4(), tasks, Vec::new()),
            Vec::new(),
            0,
        ))
    }

    #[test]
    fn test_result_skeleton_follows_phase_plan() {
        let handle = handle(vec![
            sim(json!({})).with_phase("a"),
            sim(json!({})),
            sim(json!({})).with_phase("a"),
        ]);

        let job = handle.snapshot();
        assert_eq!(job.results.phase_count(), 2);
        let flat_ids: Vec<_> = job.results.tasks().iter().map(|r| r.task.id).collect();
        assert_eq!(flat_ids, vec![job.tasks[0].id, job.tasks[2].id, job.tasks[1].id]);
        assert!(job.results.tasks().iter().all(|r| r.status.is_none()));
    }

    #[tokio::test]
    async fn test_empty_job_succeeds() {
        let controller = controller(Arc::new(SimulatedActionInvoker::new()));
        let handle = handle(Vec::new());

        assert_eq!(controller.run(handle.clone()).await, JobState::Success);
        let job = handle.snapshot();
        assert!(job.is_finished);
        assert!(job.start_time.is_some() && job.end_time.is_some());
    }

    #[tokio::test]
    async fn test_fatal_failure_halts_later_phases() {
        let invoker = Arc::new(SimulatedActionInvoker::new());
        let controller = controller(invoker.clone());
        let handle = handle(vec![
            sim(json!({})).with_phase(10),
            sim(json!({"status": "error"})).with_phase(10),
            sim(json!({})),
        ]);

        assert_eq!(controller.run(handle.clone()).await, JobState::Error);

        let job = handle.snapshot();
        let statuses: Vec<_> = job.results.tasks().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                Some(TaskResultStatus::Success),
                Some(TaskResultStatus::Error),
                None
            ]
        );
        assert_eq!(invoker.started_count(), 2);
    }

    #[tokio::test]
    async fn test_tolerated_failure_yields_warning() {
        let controller = controller(Arc::new(SimulatedActionInvoker::new()));
        let handle = handle(vec![
            sim(json!({})).with_phase(10),
            sim(json!({"status": "error"}))
                .with_phase(10)
                .with_continue_on_failure(true),
            sim(json!({})),
        ]);

        assert_eq!(controller.run(handle.clone()).await, JobState::Warning);
        let job = handle.snapshot();
        assert_eq!(job.results.tasks()[2].status, Some(TaskResultStatus::Success));
    }

    #[tokio::test]
    async fn test_cancel_waiting_job() {
        let controller = controller(Arc::new(SimulatedActionInvoker::new()));
        let handle = handle(vec![sim(json!({}))]);

        assert_eq!(handle.request_cancel().unwrap(), CancelOutcome::Cancelled);
        assert_eq!(controller.run(handle.clone()).await, JobState::Cancelled);
        assert_eq!(
            handle.request_cancel().unwrap(),
            CancelOutcome::AlreadyFinished(JobState::Cancelled)
        );
        assert!(handle.snapshot().results.tasks()[0].status.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_waiting_job_resolves_waiters() {
        let controller = controller(Arc::new(SimulatedActionInvoker::new()));
        let handle = handle(vec![sim(json!({}))]);
        let receiver = handle.subscribe();

        handle.request_cancel().unwrap();
        assert_eq!(*receiver.borrow(), JobState::Cancelled);

        controller.run(handle.clone()).await;
        let job = tokio::time::timeout(Duration::from_secs(2), handle.wait_until_finished())
            .await
            .expect("waiters resolve for a cancelled job");
        assert_eq!(job.status, JobState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_broadcast_keeps_terminal_state() {
        let controller = controller(Arc::new(SimulatedActionInvoker::new()));
        let handle = handle(vec![sim(json!({"delay": 500}))]);
        let receiver = handle.subscribe();

        let running = tokio::spawn({
            let controller = Arc::new(controller);
            let handle = handle.clone();
            async move { controller.run(handle).await }
        });
        while handle.state() != JobState::Processing {
            tokio::task::yield_now().await;
        }

        assert_eq!(handle.request_cancel().unwrap(), CancelOutcome::Terminating);
        assert_eq!(*receiver.borrow(), JobState::Terminating);
        assert_eq!(running.await.unwrap(), JobState::Terminated);

        // A broadcast issued by a slower caller after the job finished
        handle.broadcast_status();
        assert_eq!(*receiver.borrow(), JobState::Terminated);
        assert_eq!(handle.wait_until_finished().await.status, JobState::Terminated);
    }

    #[test]
    fn test_notification_recipients() {
        let notifications = vec![
            Notification::new("errors@example.test", NotificationChannel::Error),
            Notification::new("warnings@example.test", NotificationChannel::Warning),
            Notification::new("slow@example.test", NotificationChannel::Processing),
        ];
        let job_emails = vec!["errors@example.test".to_string(), "run@example.test".to_string()];

        assert_eq!(
            notification_recipients(JobState::Error, &notifications, &job_emails),
            vec!["errors@example.test", "run@example.test"]
        );
        assert_eq!(
            notification_recipients(JobState::Warning, &notifications, &[]),
            vec!["errors@example.test", "warnings@example.test"]
        );
        assert!(notification_recipients(JobState::Success, &notifications, &job_emails).is_empty());
    }
}
