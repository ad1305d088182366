//! # Orchestration Registry
//!
//! In-memory store of orchestration definitions. Every mutation bumps the
//! orchestration's `version`. Jobs never hold a reference into the registry;
//! they take an [`OrchestrationSnapshot`], a deep copy made under the entry
//! lock, so later updates only affect future jobs.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};
use crate::models::{
    CreateOrchestrationOptions, JobId, Notification, Orchestration, OrchestrationId,
    OrchestrationTask, UpdateOrchestrationOptions,
};
use crate::orchestration::schedule::CronSchedule;
use crate::validation::validate_task_list;

/// Deep copy of the parts of an orchestration a job runs with
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationSnapshot {
    pub orchestration_id: OrchestrationId,
    pub version: u64,
    pub active: bool,
    pub tasks: Vec<OrchestrationTask>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone)]
struct StoredOrchestration {
    orchestration: Orchestration,
    sequence: u64,
}

#[derive(Debug)]
pub struct OrchestrationRegistry {
    orchestrations: DashMap<OrchestrationId, StoredOrchestration>,
    sequence: AtomicU64,
    max_action_parameters_bytes: usize,
}

impl OrchestrationRegistry {
    pub fn new(max_action_parameters_bytes: usize) -> Self {
        Self {
            orchestrations: DashMap::new(),
            sequence: AtomicU64::new(0),
            max_action_parameters_bytes,
        }
    }

    pub fn create(&self, name: &str, options: CreateOrchestrationOptions) -> Result<Orchestration> {
        if name.trim().is_empty() {
            return Err(OrchestratorError::ValidationError(
                "Orchestration name must not be empty".to_string(),
            ));
        }

        validate_task_list(&options.tasks, self.max_action_parameters_bytes)?;
        let crontab_record = normalize_crontab(options.crontab_record)?;
        let active = options.active.unwrap_or(true);

        let mut orchestration = Orchestration {
            id: Uuid::new_v4(),
            name: name.to_string(),
            active,
            crontab_record,
            next_scheduled_time: None,
            tasks: assign_task_ids(&[], options.tasks),
            notifications: options.notifications,
            token_id: options.token_id,
            last_executed_job: None,
            created_at: Utc::now(),
            version: 1,
        };
        refresh_schedule(&mut orchestration);

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.orchestrations.insert(
            orchestration.id,
            StoredOrchestration {
                orchestration: orchestration.clone(),
                sequence,
            },
        );

        info!(
            orchestration_id = %orchestration.id,
            task_count = orchestration.tasks.len(),
            "Created orchestration"
        );
        Ok(orchestration)
    }

    pub fn get(&self, id: OrchestrationId) -> Result<Orchestration> {
        self.orchestrations
            .get(&id)
            .map(|entry| entry.orchestration.clone())
            .ok_or(OrchestratorError::OrchestrationNotFound(id))
    }

    pub fn contains(&self, id: OrchestrationId) -> bool {
        self.orchestrations.contains_key(&id)
    }

    /// All orchestrations in creation order
    pub fn list(&self) -> Vec<Orchestration> {
        let mut stored: Vec<StoredOrchestration> = self
            .orchestrations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        stored.sort_by_key(|s| s.sequence);
        stored.into_iter().map(|s| s.orchestration).collect()
    }

    /// Apply a partial update. An empty `crontabRecord` clears the schedule.
    pub fn update(
        &self,
        id: OrchestrationId,
        options: UpdateOrchestrationOptions,
    ) -> Result<Orchestration> {
        if options.is_empty() {
            return self.get(id);
        }
        if let Some(name) = &options.name {
            if name.trim().is_empty() {
                return Err(OrchestratorError::ValidationError(
                    "Orchestration name must not be empty".to_string(),
                ));
            }
        }
        if let Some(tasks) = &options.tasks {
            validate_task_list(tasks, self.max_action_parameters_bytes)?;
        }
        let crontab_record = options
            .crontab_record
            .map(|record| normalize_crontab(Some(record)))
            .transpose()?;

        let mut entry = self
            .orchestrations
            .get_mut(&id)
            .ok_or(OrchestratorError::OrchestrationNotFound(id))?;
        let orchestration = &mut entry.orchestration;

        if let Some(name) = options.name {
            orchestration.name = name;
        }
        if let Some(active) = options.active {
            orchestration.active = active;
        }
        if let Some(record) = crontab_record {
            orchestration.crontab_record = record;
        }
        if let Some(notifications) = options.notifications {
            orchestration.notifications = notifications;
        }
        if let Some(tasks) = options.tasks {
            orchestration.tasks = assign_task_ids(&orchestration.tasks, tasks);
        }

        orchestration.version += 1;
        refresh_schedule(orchestration);

        debug!(orchestration_id = %id, version = orchestration.version, "Updated orchestration");
        Ok(orchestration.clone())
    }

    /// Replace the task list and return the new authoritative list
    pub fn replace_tasks(
        &self,
        id: OrchestrationId,
        tasks: Vec<OrchestrationTask>,
    ) -> Result<Vec<OrchestrationTask>> {
        let updated = self.update(
            id,
            UpdateOrchestrationOptions {
                tasks: Some(tasks),
                ..Default::default()
            },
        )?;
        Ok(updated.tasks)
    }

    pub fn delete(&self, id: OrchestrationId) -> Result<Orchestration> {
        let (_, stored) = self
            .orchestrations
            .remove(&id)
            .ok_or(OrchestratorError::OrchestrationNotFound(id))?;

        info!(orchestration_id = %id, "Deleted orchestration");
        Ok(stored.orchestration)
    }

    /// Copy the current definition for a new job
    pub fn snapshot(&self, id: OrchestrationId) -> Result<OrchestrationSnapshot> {
        let entry = self
            .orchestrations
            .get(&id)
            .ok_or(OrchestratorError::OrchestrationNotFound(id))?;
        let orchestration = &entry.orchestration;

        Ok(OrchestrationSnapshot {
            orchestration_id: orchestration.id,
            version: orchestration.version,
            active: orchestration.active,
            tasks: orchestration.tasks.clone(),
            notifications: orchestration.notifications.clone(),
        })
    }

    /// Point `lastExecutedJob` at the most recently created job
    pub fn record_job(&self, id: OrchestrationId, job_id: JobId) {
        if let Some(mut entry) = self.orchestrations.get_mut(&id) {
            entry.orchestration.last_executed_job = Some(job_id);
        }
    }

    pub fn len(&self) -> usize {
        self.orchestrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orchestrations.is_empty()
    }
}

/// Keep a submitted id only if it names a task of the current list and has
/// not been claimed earlier in the submission; otherwise assign a new one.
fn assign_task_ids(
    current: &[OrchestrationTask],
    submitted: Vec<OrchestrationTask>,
) -> Vec<OrchestrationTask> {
    let known: HashSet<Uuid> = current.iter().filter_map(|task| task.id).collect();
    let mut claimed: HashSet<Uuid> = HashSet::new();

    submitted
        .into_iter()
        .map(|mut task| {
            task.id = match task.id {
                Some(id) if known.contains(&id) && claimed.insert(id) => Some(id),
                _ => Some(Uuid::new_v4()),
            };
            task
        })
        .collect()
}

fn normalize_crontab(record: Option<String>) -> Result<Option<String>> {
    match record.map(|r| r.trim().to_string()) {
        Some(record) if !record.is_empty() => {
            CronSchedule::parse(&record)?;
            Ok(Some(record))
        }
        _ => Ok(None),
    }
}

fn refresh_schedule(orchestration: &mut Orchestration) {
    orchestration.next_scheduled_time = match (&orchestration.crontab_record, orchestration.active) {
        (Some(record), true) => CronSchedule::parse(record)
            .ok()
            .and_then(|schedule| schedule.next_after(Utc::now())),
        _ => None,
    };
}
