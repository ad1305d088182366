//! # Phase Grouper
//!
//! Partitions a job's task list into the ordered phases it executes in.
//!
//! A phase's position is decided by the first task that references its key,
//! never by comparing keys. Tasks without a key each form a phase of their
//! own at their original position. Within a phase, submission order is kept,
//! so concatenating all phases yields a stable re-partition of the input.

use std::collections::HashMap;

use crate::models::{OrchestrationTask, PhaseKey, TaskId};

/// One group of tasks that run concurrently
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    /// Key that introduced the phase; `None` for a lone unkeyed task
    pub key: Option<PhaseKey>,
    /// Positions in the submitted task list, in submission order
    pub task_indices: Vec<usize>,
}

impl Phase {
    pub fn name(&self) -> Option<String> {
        self.key.as_ref().map(PhaseKey::canonical)
    }

    pub fn len(&self) -> usize {
        self.task_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_indices.is_empty()
    }
}

/// Group tasks into phases by first occurrence of their key
pub fn group_into_phases(tasks: &[OrchestrationTask]) -> Vec<Phase> {
    let mut phases: Vec<Phase> = Vec::new();
    let mut phase_by_key: HashMap<String, usize> = HashMap::new();

    for (index, task) in tasks.iter().enumerate() {
        let Some(key) = &task.phase else {
            phases.push(Phase {
                key: None,
                task_indices: vec![index],
            });
            continue;
        };

        let canonical = key.canonical();
        match phase_by_key.get(&canonical) {
            Some(&position) => phases[position].task_indices.push(index),
            None => {
                phase_by_key.insert(canonical, phases.len());
                phases.push(Phase {
                    key: Some(key.clone()),
                    task_indices: vec![index],
                });
            }
        }
    }

    phases
}

/// Flat execution order: the concatenation of all phases
pub fn execution_order(phases: &[Phase]) -> Vec<usize> {
    phases
        .iter()
        .flat_map(|phase| phase.task_indices.iter().copied())
        .collect()
}

/// Task ids per phase, for logging and events
pub fn phase_task_ids(tasks: &[OrchestrationTask], phases: &[Phase]) -> Vec<Vec<Option<TaskId>>> {
    phases
        .iter()
        .map(|phase| {
            phase
                .task_indices
                .iter()
                .map(|&index| tasks.get(index).and_then(|task| task.id))
                .collect()
        })
        .collect()
}
