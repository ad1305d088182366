//! # Job
//!
//! One execution attempt of an orchestration. A job owns a frozen copy of the
//! task list it runs and the per-task outcomes it produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::Range;
use uuid::Uuid;

use super::orchestration::OrchestrationId;
use super::task::OrchestrationTask;
use crate::state_machine::{JobState, TaskResultStatus};

pub type JobId = Uuid;

/// Outcome of one task within a job. `status` is `None` for tasks that were
/// never attempted (inactive, or not reached because the run halted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    #[serde(flatten)]
    pub task: OrchestrationTask,
    pub status: Option<TaskResultStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub response: Option<Value>,
}

impl TaskResult {
    pub fn pending(task: OrchestrationTask) -> Self {
        Self {
            task,
            status: None,
            start_time: None,
            end_time: None,
            response: None,
        }
    }

    pub fn was_attempted(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_failure(&self) -> bool {
        self.status == Some(TaskResultStatus::Error)
    }

    /// A failure that halts the run
    pub fn is_fatal_failure(&self) -> bool {
        self.is_failure() && !self.task.continue_on_failure
    }
}

/// Per-task outcomes, flat in execution order and grouped by phase.
///
/// Only the flat list is stored; phases are ranges over it, so the grouped
/// view is always a re-partition of the flat one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(into = "JobResultsDocument", from = "JobResultsDocument")]
pub struct JobResults {
    tasks: Vec<TaskResult>,
    phase_bounds: Vec<Range<usize>>,
}

impl JobResults {
    /// Build the result skeleton from phases of task results
    pub fn from_phases(phases: Vec<Vec<TaskResult>>) -> Self {
        let mut tasks = Vec::new();
        let mut phase_bounds = Vec::with_capacity(phases.len());

        for phase in phases {
            let start = tasks.len();
            tasks.extend(phase);
            phase_bounds.push(start..tasks.len());
        }

        Self {
            tasks,
            phase_bounds,
        }
    }

    pub fn tasks(&self) -> &[TaskResult] {
        &self.tasks
    }

    pub fn phase_count(&self) -> usize {
        self.phase_bounds.len()
    }

    pub fn phase(&self, index: usize) -> Option<&[TaskResult]> {
        self.phase_bounds
            .get(index)
            .map(|range| &self.tasks[range.clone()])
    }

    pub fn phases(&self) -> Vec<&[TaskResult]> {
        self.phase_bounds
            .iter()
            .map(|range| &self.tasks[range.clone()])
            .collect()
    }

    /// Flat position of a task within a phase
    pub fn flat_index(&self, phase_index: usize, position: usize) -> Option<usize> {
        let range = self.phase_bounds.get(phase_index)?;
        let index = range.start + position;
        (index < range.end).then_some(index)
    }

    pub fn record(&mut self, flat_index: usize, update: impl FnOnce(&mut TaskResult)) {
        if let Some(result) = self.tasks.get_mut(flat_index) {
            update(result);
        }
    }

    pub fn count_status(&self, status: TaskResultStatus) -> usize {
        self.tasks
            .iter()
            .filter(|r| r.status == Some(status))
            .count()
    }

    pub fn not_attempted(&self) -> usize {
        self.tasks.iter().filter(|r| !r.was_attempted()).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobResultsDocument {
    tasks: Vec<TaskResult>,
    phases: Vec<Vec<TaskResult>>,
}

impl From<JobResults> for JobResultsDocument {
    fn from(results: JobResults) -> Self {
        let phases = results
            .phase_bounds
            .iter()
            .map(|range| results.tasks[range.clone()].to_vec())
            .collect();

        Self {
            tasks: results.tasks,
            phases,
        }
    }
}

impl From<JobResultsDocument> for JobResults {
    fn from(doc: JobResultsDocument) -> Self {
        // The grouped view is authoritative on input: it carries the boundaries.
        if doc.phases.iter().map(Vec::len).sum::<usize>() == doc.tasks.len() {
            JobResults::from_phases(doc.phases)
        } else {
            JobResults::from_phases(vec![doc.tasks])
        }
    }
}

/// Job resource as exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub orchestration_id: OrchestrationId,
    pub status: JobState,
    pub is_finished: bool,
    pub created_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub notifications_emails: Vec<String>,
    /// Frozen snapshot of the tasks this job runs, in submission order
    pub tasks: Vec<OrchestrationTask>,
    pub results: JobResults,
}

impl Job {
    pub fn new(
        orchestration_id: OrchestrationId,
        tasks: Vec<OrchestrationTask>,
        notifications_emails: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            orchestration_id,
            status: JobState::Waiting,
            is_finished: false,
            created_time: Utc::now(),
            start_time: None,
            end_time: None,
            notifications_emails,
            tasks,
            results: JobResults::default(),
        }
    }

    pub fn set_status(&mut self, status: JobState) {
        self.status = status;
        self.is_finished = status.is_finished();
    }
}
