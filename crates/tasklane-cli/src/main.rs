use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tasklane_core::{
    AdmissionMode, Scheduler, SchedulerConfig, SchedulerError, StatusSnapshot, Task, TaskError,
};

/// Demo settings. Everything is optional:
///
/// ```json
/// { "scheduler": { "default_mode": "defer", "debug": true }, "delays_ms": [300, 200, 100] }
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    scheduler: SchedulerConfig,
    delays_ms: Vec<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            delays_ms: vec![300, 200, 100],
        }
    }
}

fn load_config() -> Result<DemoConfig, SchedulerError> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DemoConfig::default());
    };
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| SchedulerError::Config(format!("{path}: {e}")))?;
    Ok(serde_json::from_str(&raw)?)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A task that sleeps `ms` and then reports it.
fn sleeper(name: &str, ms: u64) -> Task {
    Task::from_future(move |_| async move {
        sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept_ms": ms }))
    })
    .with_name(name)
}

fn report(label: &str, snapshot: &StatusSnapshot) {
    info!(
        label,
        finished = snapshot.counts.finished,
        total = snapshot.counts.total,
        restarts = snapshot.restarts,
        "run completed"
    );
}

fn observed(config: &SchedulerConfig) -> Result<Scheduler, SchedulerError> {
    Scheduler::builder()
        .config(config.clone())
        .on_start(|start_count, _, resumed| info!(start_count, resumed, "started"))
        .on_progress(|s, task| {
            info!(task = task.name().unwrap_or("-"), result = %s.result, "succeeded")
        })
        .on_error(|s, task| {
            warn!(task = task.name().unwrap_or("-"), outcome = ?s.outcome, result = %s.result, "failed")
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), SchedulerError> {
    init_tracing();
    let demo = load_config()?;

    // (A) Concurrent tasks report in the order they finish.
    let scheduler = observed(&demo.scheduler)?;
    let tasks: Vec<Task> = demo
        .delays_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| sleeper(&format!("task{}", i + 1), *ms))
        .collect();
    scheduler.add(tasks, AdmissionMode::Concurrent);
    report("concurrent", &scheduler.run().await?);

    // (B) A barrier between two groups.
    let scheduler = observed(&demo.scheduler)?;
    scheduler
        .add(vec![sleeper("A1", 50), sleeper("A2", 10)], AdmissionMode::Concurrent)
        .add(sleeper("B", 20), AdmissionMode::Barrier)
        .add(sleeper("C", 5), AdmissionMode::Concurrent);
    report("barrier", &scheduler.run().await?);

    // (C) A failing task, then a restart that skips it.
    let scheduler = observed(&demo.scheduler)?;
    scheduler.add(
        vec![
            Task::named("ok", |_| Ok(Value::from("fine"))),
            Task::named("broken", |_| {
                Err(TaskError::new("broken").with_payload(json!({ "msg": "this is an error" })))
            }),
        ],
        None,
    );
    report("with failure", &scheduler.run().await?);
    scheduler.restart(true)?;
    while !scheduler.snapshot().is_drained() {
        sleep(Duration::from_millis(1)).await;
    }
    info!(collections = ?scheduler.collections(), "after restart excluding errors");

    // (D) Per-task state written by the body and read back by the observer.
    let scheduler = Scheduler::<u32>::builder()
        .on_progress(|_, task| info!(task = task.name().unwrap_or("-"), hits = *task.state(), "state"))
        .build()?;
    let counter = Arc::new(
        Task::<u32>::named("counter", |ctx| {
            *ctx.state() += 1;
            Ok(Value::Null)
        })
        .with_state(41),
    );
    scheduler.push(Arc::clone(&counter), None);
    report("stateful", &scheduler.run().await?);

    Ok(())
}
