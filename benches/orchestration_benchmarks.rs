use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use orchestrator_core::models::{Job, OrchestrationTask};
use orchestrator_core::orchestration::{group_into_phases, CronSchedule, JobHandle};
use uuid::Uuid;

fn task_list(size: usize) -> Vec<OrchestrationTask> {
    (0..size)
        .map(|i| {
            let task = OrchestrationTask::component("sim", "run").with_id(Uuid::new_v4());
            match i % 4 {
                0 => task,
                1 => task.with_phase((i % 16) as i64),
                2 => task.with_phase(format!("phase-{}", i % 8)),
                _ => task.with_phase(""),
            }
        })
        .collect()
}

fn benchmark_phase_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("phase_grouping");
    for size in [10, 100, 1000] {
        let tasks = task_list(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| group_into_phases(black_box(tasks)))
        });
    }
    group.finish();
}

fn benchmark_job_layout(c: &mut Criterion) {
    let tasks = task_list(1000);
    c.bench_function("job_handle_1000_tasks", |b| {
        b.iter(|| {
            let job = Job::new(Uuid::new_v4(), black_box(tasks.clone()), Vec::new());
            JobHandle::new(job, Vec::new(), 0)
        })
    });
}

fn benchmark_cron_next_run(c: &mut Criterion) {
    let schedule = CronSchedule::parse("*/15 9-17 * * 1-5").expect("valid crontab");
    let now = Utc::now();
    c.bench_function("cron_next_after", |b| {
        b.iter(|| schedule.next_after(black_box(now)))
    });
}

criterion_group!(
    benches,
    benchmark_phase_grouping,
    benchmark_job_layout,
    benchmark_cron_next_run
);
criterion_main!(benches);
