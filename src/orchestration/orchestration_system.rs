//! # Orchestration System
//!
//! Public entry point of the engine. Owns the orchestration registry, the
//! live job handles and the [`JobController`], and exposes the operations a
//! transport layer maps onto:
//!
//! - orchestrations: create, get, list, update, update tasks, delete
//! - jobs: create, run with overrides, get, wait, cancel
//!
//! Each created job is driven on its own tokio task. Callers get the job back
//! in `waiting` and observe it through [`OrchestrationSystem::get_job`],
//! [`OrchestrationSystem::wait_for_job`] or the event stream.

use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::constants::events;
use crate::error::{OrchestratorError, Result};
use crate::events::EventPublisher;
use crate::logging::log_job_operation;
use crate::models::{
    CreateOrchestrationOptions, Job, JobId, Orchestration, OrchestrationId, OrchestrationTask,
    UpdateOrchestrationOptions,
};
use crate::orchestration::job_controller::{CancelOutcome, JobController, JobHandle};
use crate::orchestration::phase_scheduler::PhaseScheduler;
use crate::orchestration::registry::OrchestrationRegistry;
use crate::orchestration::task_executor::TaskExecutor;
use crate::registry::ActionRegistry;
use crate::validation::{resolve_run_overrides, validate_task_list};

pub struct OrchestrationSystem {
    config: Arc<EngineConfig>,
    registry: OrchestrationRegistry,
    actions: Arc<ActionRegistry>,
    event_publisher: EventPublisher,
    controller: Arc<JobController>,
    /// Live and finished jobs, bounded by `max_retained_jobs`
    jobs: DashMap<JobId, Arc<JobHandle>>,
    job_sequence: AtomicU64,
}

impl OrchestrationSystem {
    pub fn new(config: EngineConfig, actions: Arc<ActionRegistry>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let event_publisher = EventPublisher::new(config.event_channel_capacity);
        let executor = TaskExecutor::new(
            Arc::clone(&actions),
            Arc::clone(&config),
            event_publisher.clone(),
        );
        let controller = JobController::new(
            PhaseScheduler::new(executor),
            event_publisher.clone(),
            config.max_concurrent_jobs,
        );

        info!(
            max_concurrent_tasks = config.max_concurrent_tasks,
            max_concurrent_jobs = config.max_concurrent_jobs,
            components = actions.stats().total_components,
            "Orchestration system initialized"
        );

        Ok(Self {
            registry: OrchestrationRegistry::new(config.max_action_parameters_bytes),
            config,
            actions,
            event_publisher,
            controller: Arc::new(controller),
            jobs: DashMap::new(),
            job_sequence: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.event_publisher
    }

    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    // Orchestrations

    pub fn create_orchestration(
        &self,
        name: &str,
        options: CreateOrchestrationOptions,
    ) -> Result<Orchestration> {
        let orchestration = self.registry.create(name, options)?;
        self.event_publisher.publish(
            events::ORCHESTRATION_CREATED,
            json!({
                "orchestration_id": orchestration.id,
                "name": orchestration.name,
                "task_count": orchestration.tasks.len(),
            }),
        );
        Ok(orchestration)
    }

    pub fn get_orchestration(&self, id: OrchestrationId) -> Result<Orchestration> {
        self.registry.get(id)
    }

    pub fn list_orchestrations(&self) -> Vec<Orchestration> {
        self.registry.list()
    }

    pub fn update_orchestration(
        &self,
        id: OrchestrationId,
        options: UpdateOrchestrationOptions,
    ) -> Result<Orchestration> {
        let orchestration = self.registry.update(id, options)?;
        self.publish_updated(&orchestration);
        Ok(orchestration)
    }

    /// Replace the task list; returns the stored list with its assigned ids
    pub fn update_tasks(
        &self,
        id: OrchestrationId,
        tasks: Vec<OrchestrationTask>,
    ) -> Result<Vec<OrchestrationTask>> {
        let tasks = self.registry.replace_tasks(id, tasks)?;
        let orchestration = self.registry.get(id)?;
        self.publish_updated(&orchestration);
        Ok(tasks)
    }

    /// Remove the definition. Jobs created from it keep running on their
    /// snapshots and stay queryable until evicted by job retention.
    pub fn delete_orchestration(&self, id: OrchestrationId) -> Result<()> {
        let orchestration = self.registry.delete(id)?;
        self.event_publisher.publish(
            events::ORCHESTRATION_DELETED,
            json!({
                "orchestration_id": orchestration.id,
                "name": orchestration.name,
            }),
        );
        Ok(())
    }

    /// Jobs of one orchestration, newest first
    pub fn get_orchestration_jobs(&self, id: OrchestrationId) -> Result<Vec<Job>> {
        if !self.registry.contains(id) {
            return Err(OrchestratorError::OrchestrationNotFound(id));
        }

        let mut handles: Vec<Arc<JobHandle>> = self
            .jobs
            .iter()
            .filter(|entry| entry.orchestration_id() == id)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        handles.sort_by_key(|handle| std::cmp::Reverse(handle.sequence()));

        Ok(handles.iter().map(|handle| handle.snapshot()).collect())
    }

    fn publish_updated(&self, orchestration: &Orchestration) {
        self.event_publisher.publish(
            events::ORCHESTRATION_UPDATED,
            json!({
                "orchestration_id": orchestration.id,
                "version": orchestration.version,
                "task_count": orchestration.tasks.len(),
            }),
        );
    }

    // Jobs

    /// Start a job from the stored task list
    pub async fn create_job(
        &self,
        orchestration_id: OrchestrationId,
        notifications_emails: Vec<String>,
    ) -> Result<Job> {
        self.run_orchestration(orchestration_id, notifications_emails, Vec::new())
            .await
    }

    /// Start a job. A non-empty `tasks` list replaces the stored one for this
    /// run only, after being checked against the stored definitions.
    #[instrument(skip(self, notifications_emails, tasks), fields(override_count = tasks.len()))]
    pub async fn run_orchestration(
        &self,
        orchestration_id: OrchestrationId,
        notifications_emails: Vec<String>,
        tasks: Vec<OrchestrationTask>,
    ) -> Result<Job> {
        let snapshot = self.registry.snapshot(orchestration_id)?;

        let job_tasks = if tasks.is_empty() {
            snapshot.tasks
        } else {
            validate_task_list(&tasks, self.config.max_action_parameters_bytes)?;
            resolve_run_overrides(&snapshot.tasks, &tasks)?
        };

        let job = Job::new(orchestration_id, job_tasks, notifications_emails);
        let sequence = self.job_sequence.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(JobHandle::new(job, snapshot.notifications, sequence));
        let job = handle.snapshot();

        self.jobs.insert(job.id, Arc::clone(&handle));
        self.registry.record_job(orchestration_id, job.id);
        self.evict_finished_jobs();

        log_job_operation(
            "create",
            job.id,
            Some(orchestration_id),
            &job.status.to_string(),
            Some(&format!(
                "{} tasks in {} phases from orchestration version {}",
                job.tasks.len(),
                handle.phases().len(),
                snapshot.version
            )),
        );
        self.event_publisher.publish(
            events::JOB_CREATED,
            json!({
                "job_id": job.id,
                "orchestration_id": orchestration_id,
                "task_count": job.tasks.len(),
                "phase_count": handle.phases().len(),
                "orchestration_version": snapshot.version,
            }),
        );

        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            controller.run(handle).await;
        });

        Ok(job)
    }

    pub fn get_job(&self, id: JobId) -> Result<Job> {
        self.handle(id).map(|handle| handle.snapshot())
    }

    /// Resolve once the job is finished
    pub async fn wait_for_job(&self, id: JobId) -> Result<Job> {
        let handle = self.handle(id)?;
        Ok(handle.wait_until_finished().await)
    }

    /// Request cancellation and return the job as it is right after the
    /// request. Cancelling a finished job changes nothing.
    pub fn cancel_job(&self, id: JobId) -> Result<Job> {
        let handle = self.handle(id)?;
        let outcome = handle.request_cancel()?;

        match outcome {
            CancelOutcome::Cancelled => self.controller.publish_finished(&handle),
            CancelOutcome::Terminating | CancelOutcome::AlreadyRequested => {}
            CancelOutcome::AlreadyFinished(state) => {
                warn!(job_id = %id, %state, "Cancel requested for a finished job");
            }
        }

        let job = handle.snapshot();
        self.event_publisher.publish(
            events::JOB_CANCEL_REQUESTED,
            json!({
                "job_id": job.id,
                "orchestration_id": job.orchestration_id,
                "status": job.status,
                "outcome": format!("{outcome:?}"),
            }),
        );
        Ok(job)
    }

    /// Drop the oldest finished jobs once more than `max_retained_jobs` are
    /// tracked. Unfinished jobs are never evicted.
    fn evict_finished_jobs(&self) {
        let excess = self.jobs.len().saturating_sub(self.config.max_retained_jobs);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<(u64, JobId)> = self
            .jobs
            .iter()
            .filter(|entry| entry.is_finished())
            .map(|entry| (entry.sequence(), *entry.key()))
            .collect();
        finished.sort_unstable();

        let mut evicted = 0;
        for (_, id) in finished.into_iter().take(excess) {
            if self.jobs.remove(&id).is_some() {
                evicted += 1;
            }
        }
        debug!(evicted, retained = self.jobs.len(), "Evicted finished jobs");
    }

    fn handle(&self, id: JobId) -> Result<Arc<JobHandle>> {
        self.jobs
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(OrchestratorError::JobNotFound(id))
    }
}

impl std::fmt::Debug for OrchestrationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationSystem")
            .field("config", &self.config)
            .field("orchestrations", &self.registry.len())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::JobState;
    use crate::test_helpers::SimulatedActionInvoker;
    use uuid::Uuid;

    fn system() -> OrchestrationSystem {
        let actions = Arc::new(ActionRegistry::new());
        actions.register_component("sim", Arc::new(SimulatedActionInvoker::new()));
        let config = EngineConfig {
            poll_interval_ms: 5,
            max_poll_interval_ms: 10,
            ..Default::default()
        };
        OrchestrationSystem::new(config, actions).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };
        assert!(OrchestrationSystem::new(config, Arc::new(ActionRegistry::new())).is_err());
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let system = system();
        let missing = Uuid::new_v4();

        assert!(matches!(
            system.create_job(missing, Vec::new()).await,
            Err(OrchestratorError::OrchestrationNotFound(_))
        ));
        assert!(matches!(
            system.cancel_job(missing),
            Err(OrchestratorError::JobNotFound(_))
        ));
        assert!(system.get_orchestration_jobs(missing).is_err());
    }

    #[tokio::test]
    async fn test_job_created_waiting_and_tracked() {
        let system = system();
        let orchestration = system
            .create_orchestration(
                "tracked",
                CreateOrchestrationOptions {
                    tasks: vec![OrchestrationTask::component("sim", "run")],
                    ..Default::default()
                },
            )
            .unwrap();

        let job = system.create_job(orchestration.id, Vec::new()).await.unwrap();
        assert_eq!(job.status, JobState::Waiting);
        assert_eq!(
            system.get_orchestration(orchestration.id).unwrap().last_executed_job,
            Some(job.id)
        );

        let finished = system.wait_for_job(job.id).await.unwrap();
        assert_eq!(finished.status, JobState::Success);
        assert!(finished.is_finished);

        let jobs = system.get_orchestration_jobs(orchestration.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, job.id);
    }

    #[tokio::test]
    async fn test_oldest_finished_jobs_evicted_past_retention() {
        let actions = Arc::new(ActionRegistry::new());
        actions.register_component("sim", Arc::new(SimulatedActionInvoker::new()));
        let config = EngineConfig {
            poll_interval_ms: 5,
            max_poll_interval_ms: 10,
            max_retained_jobs: 2,
            ..Default::default()
        };
        let system = OrchestrationSystem::new(config, actions).unwrap();
        let options = || CreateOrchestrationOptions {
            tasks: vec![OrchestrationTask::component("sim", "run")],
            ..Default::default()
        };

        // A finished job whose orchestration is gone
        let removed = system.create_orchestration("removed", options()).unwrap();
        let orphan = system.create_job(removed.id, Vec::new()).await.unwrap();
        system.wait_for_job(orphan.id).await.unwrap();
        system.delete_orchestration(removed.id).unwrap();
        assert!(system.get_job(orphan.id).is_ok());

        let kept = system.create_orchestration("kept", options()).unwrap();
        let first = system.create_job(kept.id, Vec::new()).await.unwrap();
        system.wait_for_job(first.id).await.unwrap();
        let second = system.create_job(kept.id, Vec::new()).await.unwrap();

        assert!(matches!(
            system.get_job(orphan.id),
            Err(OrchestratorError::JobNotFound(_))
        ));
        assert!(system.get_job(first.id).is_ok());
        assert!(system.get_job(second.id).is_ok());
        system.wait_for_job(second.id).await.unwrap();
    }
}
