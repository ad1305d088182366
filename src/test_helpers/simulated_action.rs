//! Simulated external action, configured entirely through `actionParameters`:
//!
//! - `delay`: milliseconds until the action finishes (default 0)
//! - `status`: final status, `"success"` by default
//! - `polls`: extra polls required after the delay has elapsed
//! - `interruptible`: whether `terminate` stops it (default true)
//! - `startError`: fail the start call with this message
//!
//! Time is measured with `tokio::time::Instant`, so tests running on a paused
//! clock see deterministic durations.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::orchestration::types::{ActionError, ActionInvoker, ActionRequest, ActionResponse};

#[derive(Debug, Clone)]
struct SimulatedRun {
    finishes_at: Instant,
    status: String,
    polls_remaining: u64,
    interruptible: bool,
}

/// Interval during which one simulated action was running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpan {
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct SimulatedActionInvoker {
    runs: DashMap<String, SimulatedRun>,
    next_id: AtomicUsize,
    started: AtomicUsize,
    terminated: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    requests: Mutex<Vec<ActionRequest>>,
    spans: DashMap<String, ActionSpan>,
}

impl SimulatedActionInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Highest number of actions observed running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Every request passed to `start`, in call order
    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().clone()
    }

    pub fn spans(&self) -> Vec<ActionSpan> {
        self.spans.iter().map(|entry| *entry.value()).collect()
    }

    fn finish(&self, id: &str) {
        if self.runs.remove(id).is_some() {
            self.running.fetch_sub(1, Ordering::SeqCst);
            if let Some(mut span) = self.spans.get_mut(id) {
                span.finished_at = Some(Instant::now());
            }
        }
    }
}

fn parameter_u64(parameters: &Value, key: &str) -> u64 {
    parameters.get(key).and_then(Value::as_u64).unwrap_or(0)
}

#[async_trait]
impl ActionInvoker for SimulatedActionInvoker {
    async fn start(&self, request: &ActionRequest) -> Result<ActionResponse, ActionError> {
        self.requests.lock().push(request.clone());
        let parameters = &request.parameters;

        if let Some(message) = parameters.get("startError").and_then(Value::as_str) {
            return Err(ActionError::Invocation(message.to_string()));
        }

        self.started.fetch_add(1, Ordering::SeqCst);
        let id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let status = parameters
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("success")
            .to_string();
        let delay = Duration::from_millis(parameter_u64(parameters, "delay"));
        let polls = parameter_u64(parameters, "polls");
        let now = Instant::now();

        if delay.is_zero() && polls == 0 {
            self.spans.insert(
                id.clone(),
                ActionSpan {
                    started_at: now,
                    finished_at: Some(now),
                },
            );
            return Ok(ActionResponse::finished(status).with_id(id));
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
        self.spans.insert(
            id.clone(),
            ActionSpan {
                started_at: now,
                finished_at: None,
            },
        );
        self.runs.insert(
            id.clone(),
            SimulatedRun {
                finishes_at: now + delay,
                status,
                polls_remaining: polls,
                interruptible: parameters
                    .get("interruptible")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            },
        );

        Ok(ActionResponse::running(id))
    }

    async fn poll(
        &self,
        _request: &ActionRequest,
        response: &ActionResponse,
    ) -> Result<ActionResponse, ActionError> {
        let id = response
            .id
            .clone()
            .ok_or_else(|| ActionError::Protocol("response has no id".to_string()))?;

        let finished_status = {
            let mut run = self
                .runs
                .get_mut(&id)
                .ok_or_else(|| ActionError::Protocol(format!("unknown action run {id}")))?;

            if Instant::now() < run.finishes_at {
                None
            } else if run.polls_remaining > 0 {
                run.polls_remaining -= 1;
                None
            } else {
                Some(run.status.clone())
            }
        };

        match finished_status {
            Some(status) => {
                self.finish(&id);
                Ok(ActionResponse::finished(status).with_id(id))
            }
            None => Ok(ActionResponse::running(id)),
        }
    }

    async fn terminate(
        &self,
        _request: &ActionRequest,
        response: &ActionResponse,
    ) -> Result<bool, ActionError> {
        let Some(id) = response.id.as_deref() else {
            return Ok(false);
        };

        let interruptible = self
            .runs
            .get(id)
            .map(|run| run.interruptible)
            .unwrap_or(false);

        if interruptible {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            self.finish(id);
        }

        Ok(interruptible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionRef;
    use serde_json::json;
    use uuid::Uuid;

    fn request(parameters: Value) -> ActionRequest {
        ActionRequest {
            job_id: Uuid::new_v4(),
            task_id: None,
            action: ActionRef::named("sim", "run"),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_immediate_finish() {
        let invoker = SimulatedActionInvoker::new();
        let response = invoker.start(&request(json!({}))).await.unwrap();
        assert!(response.is_finished);
        assert_eq!(response.status, "success");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_and_extra_polls() {
        let invoker = SimulatedActionInvoker::new();
        let req = request(json!({"delay": 100, "polls": 1, "status": "error"}));

        let response = invoker.start(&req).await.unwrap();
        assert!(!response.is_finished);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let response = invoker.poll(&req, &response).await.unwrap();
        assert!(!response.is_finished, "one extra poll required");

        let response = invoker.poll(&req, &response).await.unwrap();
        assert!(response.is_finished);
        assert_eq!(response.status, "error");
        assert_eq!(invoker.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_terminate_respects_interruptible_flag() {
        let invoker = SimulatedActionInvoker::new();

        let req = request(json!({"delay": 10_000}));
        let response = invoker.start(&req).await.unwrap();
        assert!(invoker.terminate(&req, &response).await.unwrap());

        let req = request(json!({"delay": 10_000, "interruptible": false}));
        let response = invoker.start(&req).await.unwrap();
        assert!(!invoker.terminate(&req, &response).await.unwrap());
        assert_eq!(invoker.terminated_count(), 1);
    }

    #[tokio::test]
    async fn test_start_error() {
        let invoker = SimulatedActionInvoker::new();
        let result = invoker.start(&request(json!({"startError": "boom"}))).await;
        assert_eq!(result, Err(ActionError::Invocation("boom".to_string())));
    }
}
