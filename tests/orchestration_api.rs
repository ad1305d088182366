//! Orchestration management through the facade: definitions, snapshots,
//! run-time overrides, notifications and schedules.

mod common;

use common::*;
use orchestrator_core::constants::events;
use orchestrator_core::models::{
    CreateOrchestrationOptions, Notification, NotificationChannel, OrchestrationTask, PhaseKey,
    UpdateOrchestrationOptions,
};
use orchestrator_core::state_machine::{JobState, TaskResultStatus};
use orchestrator_core::OrchestratorError;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test]
async fn test_orchestration_crud() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;

    let created = system.create_orchestration(
        "crud",
        CreateOrchestrationOptions {
            tasks: vec![sim(0), sim(0).with_phase("load")],
            token_id: Some("token-123".to_string()),
            ..Default::default()
        },
    )?;
    assert!(created.active);
    assert_eq!(created.token_id.as_deref(), Some("token-123"));
    assert_eq!(system.list_orchestrations().len(), 1);

    let updated = system.update_orchestration(
        created.id,
        UpdateOrchestrationOptions {
            name: Some("renamed".to_string()),
            active: Some(false),
            ..Default::default()
        },
    )?;
    assert_eq!(updated.name, "renamed");
    assert!(!updated.active);
    assert_eq!(updated.tasks, created.tasks);

    let tasks = system.update_tasks(created.id, vec![created.tasks[1].clone()])?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, created.tasks[1].id);
    assert_eq!(system.get_orchestration(created.id)?.tasks, tasks);

    assert_ok!(system.delete_orchestration(created.id));
    assert!(matches!(
        system.get_orchestration(created.id),
        Err(OrchestratorError::OrchestrationNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_delete_unknown_orchestration_rejected() {
    let engine = engine();
    let result = engine.system.delete_orchestration(Uuid::new_v4());

    let err = assert_err!(result);
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test(start_paused = true)]
async fn test_running_job_keeps_its_snapshot() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let orchestration = system.create_orchestration("snapshot", options(vec![sim(0)]))?;

    // Updates before the job starts are what the job runs
    let configured = system.update_tasks(orchestration.id, vec![sim(200), sim(100).with_phase("b")])?;
    let job = system.create_job(orchestration.id, Vec::new()).await?;
    wait_for_state(system, job.id, JobState::Processing).await;

    system.update_tasks(orchestration.id, vec![failing()])?;
    system.update_orchestration(
        orchestration.id,
        UpdateOrchestrationOptions {
            notifications: Some(vec![Notification::new(
                "late@example.test",
                NotificationChannel::Error,
            )]),
            ..Default::default()
        },
    )?;

    let finished = system.wait_for_job(job.id).await?;
    assert_eq!(finished.status, JobState::Success);
    assert_eq!(finished.tasks, configured);
    let result_ids: Vec<_> = finished.results.tasks().iter().map(|r| r.task.id).collect();
    assert_eq!(result_ids, vec![configured[0].id, configured[1].id]);

    // The orchestration record itself moved on
    assert_eq!(system.get_orchestration(orchestration.id)?.tasks.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_falsy_phases_run_as_single_task_phases() -> anyhow::Result<()> {
    let engine = engine();
    let tasks: Vec<OrchestrationTask> = serde_json::from_value(json!([
        {"component": COMPONENT, "action": "run", "phase": null},
        {"component": COMPONENT, "action": "run", "phase": ""},
        {"component": COMPONENT, "action": "run"},
        {"component": COMPONENT, "action": "run", "phase": "0"},
        {"component": COMPONENT, "action": "run", "phase": "0"},
    ]))?;

    let job = run_to_completion(&engine, tasks).await;

    assert_eq!(job.status, JobState::Success);
    let sizes: Vec<usize> = job.results.phases().iter().map(|p| p.len()).collect();
    assert_eq!(sizes, vec![1, 1, 1, 2]);
    assert_eq!(
        job.results.phases()[3][0].task.phase,
        Some(PhaseKey::Name("0".to_string()))
    );
    let flat: Vec<_> = job.results.tasks().iter().map(|r| r.task.id).collect();
    let submitted: Vec<_> = job.tasks.iter().map(|t| t.id).collect();
    assert_eq!(flat, submitted);
    Ok(())
}

#[tokio::test]
async fn test_run_with_mismatched_override_fails_validation() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let orchestration = system.create_orchestration("overrides", options(vec![sim(0)]))?;

    let result = system
        .run_orchestration(
            orchestration.id,
            Vec::new(),
            vec![OrchestrationTask::component("other.component", "run")],
        )
        .await;

    let err = assert_err!(result);
    assert_eq!(err.error_code(), "JOB_VALIDATION");
    let response = err.to_response();
    assert_eq!(response.status, "warning");
    assert!(response.message.contains("different from orchestration task"));

    // Nothing was created
    assert!(system.get_orchestration_jobs(orchestration.id)?.is_empty());
    assert!(system.get_orchestration(orchestration.id)?.last_executed_job.is_none());
    Ok(())
}

#[tokio::test]
async fn test_run_with_overrides_uses_submitted_settings() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let orchestration =
        system.create_orchestration("overrides", options(vec![sim(0), failing()]))?;
    let stored = orchestration.tasks.clone();

    let overrides = vec![
        stored[1].clone().with_continue_on_failure(true),
        stored[0].clone().with_action_parameters(json!({"status": "success", "marker": 1})),
    ];
    let job = system
        .run_orchestration(orchestration.id, Vec::new(), overrides)
        .await?;
    let job = system.wait_for_job(job.id).await?;

    assert_eq!(job.status, JobState::Warning);
    assert_eq!(job.tasks[0].id, stored[1].id);
    assert_eq!(job.tasks[1].action_parameters["marker"], 1);

    // Stored definition is untouched
    assert_eq!(system.get_orchestration(orchestration.id)?.tasks, stored);
    Ok(())
}

#[tokio::test]
async fn test_jobs_listed_newest_first() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let orchestration = system.create_orchestration("history", options(vec![sim(0)]))?;

    let first = system.create_job(orchestration.id, Vec::new()).await?;
    let second = system.create_job(orchestration.id, Vec::new()).await?;
    system.wait_for_job(first.id).await?;
    system.wait_for_job(second.id).await?;

    let ids: Vec<_> = system
        .get_orchestration_jobs(orchestration.id)?
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
    assert_eq!(
        system.get_orchestration(orchestration.id)?.last_executed_job,
        Some(second.id)
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_job_requests_notifications() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let mut events_rx = system.events().subscribe();

    let orchestration = system.create_orchestration(
        "notify",
        CreateOrchestrationOptions {
            tasks: vec![failing()],
            notifications: vec![
                Notification::new("errors@example.test", NotificationChannel::Error),
                Notification::new("warnings@example.test", NotificationChannel::Warning),
                Notification::new("progress@example.test", NotificationChannel::Processing),
            ],
            ..Default::default()
        },
    )?;

    let job = system
        .create_job(orchestration.id, vec!["owner@example.test".to_string()])
        .await?;
    let job = system.wait_for_job(job.id).await?;
    assert_eq!(job.status, JobState::Error);
    assert_eq!(job.results.tasks()[0].status, Some(TaskResultStatus::Error));

    let mut names = Vec::new();
    let mut recipients = None;
    while let Ok(event) = events_rx.try_recv() {
        if event.name == events::JOB_NOTIFICATION_REQUESTED {
            recipients = Some(event.context["recipients"].clone());
        }
        names.push(event.name);
    }

    assert_eq!(
        recipients,
        Some(json!(["errors@example.test", "owner@example.test"]))
    );
    for expected in [
        events::ORCHESTRATION_CREATED,
        events::JOB_CREATED,
        events::JOB_STARTED,
        events::JOB_PHASE_STARTED,
        events::JOB_TASK_STARTED,
        events::JOB_TASK_COMPLETED,
        events::JOB_PHASE_COMPLETED,
        events::JOB_FINISHED,
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
    Ok(())
}

#[tokio::test]
async fn test_successful_job_requests_no_notifications() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let mut events_rx = system.events().subscribe();

    let orchestration = system.create_orchestration(
        "quiet",
        CreateOrchestrationOptions {
            tasks: vec![sim(0)],
            notifications: vec![Notification::new("errors@example.test", NotificationChannel::Error)],
            ..Default::default()
        },
    )?;
    let job = system.create_job(orchestration.id, Vec::new()).await?;
    system.wait_for_job(job.id).await?;

    while let Ok(event) = events_rx.try_recv() {
        assert_ne!(event.name, events::JOB_NOTIFICATION_REQUESTED);
    }
    Ok(())
}

#[test]
fn test_schedule_follows_crontab_and_active_flag() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;

    let orchestration = system.create_orchestration(
        "scheduled",
        CreateOrchestrationOptions {
            crontab_record: Some("1 1 1 1 1".to_string()),
            ..Default::default()
        },
    )?;
    let next = orchestration.next_scheduled_time.expect("active with crontab");
    assert!(next > chrono::Utc::now());

    let cleared = system.update_orchestration(
        orchestration.id,
        UpdateOrchestrationOptions {
            crontab_record: Some(String::new()),
            ..Default::default()
        },
    )?;
    assert!(cleared.crontab_record.is_none());
    assert!(cleared.next_scheduled_time.is_none());

    let invalid = system.update_orchestration(
        orchestration.id,
        UpdateOrchestrationOptions {
            crontab_record: Some("61 * * * *".to_string()),
            ..Default::default()
        },
    );
    assert!(invalid.is_err());
    Ok(())
}

#[tokio::test]
async fn test_inactive_orchestration_can_still_run_manually() -> anyhow::Result<()> {
    let engine = engine();
    let system = &engine.system;
    let orchestration = system.create_orchestration(
        "manual",
        CreateOrchestrationOptions {
            active: Some(false),
            tasks: vec![sim(0)],
            ..Default::default()
        },
    )?;

    let job = system.create_job(orchestration.id, Vec::new()).await?;
    assert_eq!(system.wait_for_job(job.id).await?.status, JobState::Success);
    Ok(())
}
