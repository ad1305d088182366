//! Input validation for the orchestration engine
//!
//! Structural checks for task lists and their `actionParameters` documents,
//! plus the run-time override check that produces `JOB_VALIDATION` failures.

use crate::constants::system::{MAX_ACTION_PARAMETERS_DEPTH, MAX_TASKS_PER_ORCHESTRATION};
use crate::error::{OrchestratorError, Result};
use crate::models::{ActionRef, OrchestrationTask};
use serde_json::Value;

/// Maximum number of keys in a JSON object or items in an array
const MAX_JSON_KEYS: usize = 1000;

/// Maximum string length for JSON string values and keys
const MAX_JSON_STRING_LENGTH: usize = 10_000;

/// Validates an `actionParameters` document for size and shape
pub fn validate_action_parameters(value: &Value, max_bytes: usize) -> Result<()> {
    if !value.is_object() {
        return Err(OrchestratorError::ValidationError(
            "actionParameters must be a JSON object".to_string(),
        ));
    }

    let serialized = serde_json::to_vec(value)?;
    if serialized.len() > max_bytes {
        return Err(OrchestratorError::ValidationError(format!(
            "actionParameters too large: {} bytes (max: {max_bytes})",
            serialized.len()
        )));
    }

    validate_json_depth(value, 0)
}

/// Validates JSON depth recursively
fn validate_json_depth(value: &Value, current_depth: usize) -> Result<()> {
    if current_depth > MAX_ACTION_PARAMETERS_DEPTH {
        return Err(OrchestratorError::ValidationError(format!(
            "JSON nesting too deep: {current_depth} (max: {MAX_ACTION_PARAMETERS_DEPTH})"
        )));
    }

    match value {
        Value::Object(map) => {
            if map.len() > MAX_JSON_KEYS {
                return Err(OrchestratorError::ValidationError(format!(
                    "Too many JSON keys: {} (max: {MAX_JSON_KEYS})",
                    map.len()
                )));
            }

            for (key, val) in map {
                if key.len() > MAX_JSON_STRING_LENGTH {
                    return Err(OrchestratorError::ValidationError(format!(
                        "JSON key too long: {} chars (max: {MAX_JSON_STRING_LENGTH})",
                        key.len()
                    )));
                }
                validate_json_depth(val, current_depth + 1)?;
            }
        }
        Value::Array(items) => {
            if items.len() > MAX_JSON_KEYS {
                return Err(OrchestratorError::ValidationError(format!(
                    "JSON array too large: {} items (max: {MAX_JSON_KEYS})",
                    items.len()
                )));
            }

            for item in items {
                validate_json_depth(item, current_depth + 1)?;
            }
        }
        Value::String(s) if s.len() > MAX_JSON_STRING_LENGTH => {
            return Err(OrchestratorError::ValidationError(format!(
                "JSON string too long: {} chars (max: {MAX_JSON_STRING_LENGTH})",
                s.len()
            )));
        }
        _ => {}
    }

    Ok(())
}

/// Validates one task's addressing and parameters
pub fn validate_task(index: usize, task: &OrchestrationTask, max_parameter_bytes: usize) -> Result<()> {
    let invalid = |reason: String| OrchestratorError::InvalidTask { index, reason };

    match &task.action {
        ActionRef::Named { component, .. } if component.trim().is_empty() => {
            return Err(invalid("component must not be empty".to_string()));
        }
        ActionRef::Direct { url } if url.trim().is_empty() => {
            return Err(invalid("componentUrl must not be empty".to_string()));
        }
        _ => {}
    }

    if task.timeout_minutes == Some(0) {
        return Err(invalid("timeoutMinutes must be a positive integer".to_string()));
    }

    validate_action_parameters(&task.action_parameters, max_parameter_bytes)
        .map_err(|e| invalid(e.to_string()))
}

/// Validates a complete task list before it is stored or run
pub fn validate_task_list(tasks: &[OrchestrationTask], max_parameter_bytes: usize) -> Result<()> {
    if tasks.len() > MAX_TASKS_PER_ORCHESTRATION {
        return Err(OrchestratorError::ValidationError(format!(
            "Too many tasks: {} (max: {MAX_TASKS_PER_ORCHESTRATION})",
            tasks.len()
        )));
    }

    for (index, task) in tasks.iter().enumerate() {
        validate_task(index, task, max_parameter_bytes)?;
    }

    Ok(())
}

/// Checks run-time task overrides against the stored definitions and returns
/// the task list the job should run.
///
/// Each override is matched to a stored task by `id`, or by position when it
/// carries none. The action addressing must be identical; every other field
/// may differ. Matched overrides take the stored task's id.
pub fn resolve_run_overrides(
    stored: &[OrchestrationTask],
    overrides: &[OrchestrationTask],
) -> Result<Vec<OrchestrationTask>> {
    overrides
        .iter()
        .enumerate()
        .map(|(index, task)| {
            let original = match task.id {
                Some(id) => stored.iter().find(|s| s.id == Some(id)),
                None => stored.get(index),
            };

            match original {
                Some(original) if original.same_action(task) => {
                    let mut resolved = task.clone();
                    resolved.id = original.id;
                    Ok(resolved)
                }
                _ => Err(OrchestratorError::JobValidation {
                    message: format!("Task {index} is different from orchestration task"),
                }),
            }
        })
        .collect()
}
