//! Shared setup for the integration tests

#![allow(dead_code)]

use orchestrator_core::config::EngineConfig;
use orchestrator_core::models::{CreateOrchestrationOptions, Job, JobId, OrchestrationTask};
use orchestrator_core::orchestration::OrchestrationSystem;
use orchestrator_core::registry::ActionRegistry;
use orchestrator_core::state_machine::JobState;
use orchestrator_core::test_helpers::SimulatedActionInvoker;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const COMPONENT: &str = "sim";

pub struct TestEngine {
    pub system: OrchestrationSystem,
    pub invoker: Arc<SimulatedActionInvoker>,
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 5,
        max_poll_interval_ms: 10,
        ..Default::default()
    }
}

pub fn engine() -> TestEngine {
    engine_with(fast_config())
}

pub fn engine_with(config: EngineConfig) -> TestEngine {
    orchestrator_core::logging::init_structured_logging();

    let invoker = Arc::new(SimulatedActionInvoker::new());
    let actions = Arc::new(ActionRegistry::new());
    actions.register_component(COMPONENT, invoker.clone());
    actions.set_url_invoker(invoker.clone());

    let system = OrchestrationSystem::new(config, actions).expect("valid test config");
    TestEngine { system, invoker }
}

/// A simulated task that runs for `delay_ms`
pub fn sim(delay_ms: u64) -> OrchestrationTask {
    sim_with(json!({ "delay": delay_ms }))
}

pub fn sim_with(parameters: Value) -> OrchestrationTask {
    OrchestrationTask::component(COMPONENT, "run").with_action_parameters(parameters)
}

pub fn failing() -> OrchestrationTask {
    sim_with(json!({ "status": "error" }))
}

pub fn options(tasks: Vec<OrchestrationTask>) -> CreateOrchestrationOptions {
    CreateOrchestrationOptions {
        tasks,
        ..Default::default()
    }
}

/// Create an orchestration with `tasks`, run it and wait for the result
pub async fn run_to_completion(engine: &TestEngine, tasks: Vec<OrchestrationTask>) -> Job {
    let orchestration = engine
        .system
        .create_orchestration("integration", options(tasks))
        .expect("orchestration created");
    let job = engine
        .system
        .create_job(orchestration.id, Vec::new())
        .await
        .expect("job created");
    engine.system.wait_for_job(job.id).await.expect("job exists")
}

/// Poll until the job reaches `state`
pub async fn wait_for_state(system: &OrchestrationSystem, job_id: JobId, state: JobState) -> Job {
    for _ in 0..1000 {
        let job = system.get_job(job_id).expect("job exists");
        if job.status == state {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("job {job_id} never reached {state}");
}
