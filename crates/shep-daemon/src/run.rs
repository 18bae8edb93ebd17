// run.rs — The deterministic supervisor loop.
//
// Committed write order per iteration:
//   plan → progress → active-task (create) → [agent] → last-result →
//   active-task (delete) → plan → progress → summary
//
// A crash between any two steps leaves the on-disk state consistent with
// the last completed rename; a surviving active-task lock is the crash
// marker that halts the next run before it touches anything.

use serde_json::{json, Value};
use tracing::{info, warn};

use shep_agent::{AgentClient, AgentError};
use shep_planner::Planner;
use shep_state::{Config, StateStore, TaskStatus};
use shep_watchdog::RetryTracker;

use crate::error::LoopError;

/// Hard upper bound on per-task retries, regardless of config. A task
/// that fails twice in one run needs a human, not a third attempt.
const MAX_RETRIES_CLAMP: u32 = 1;

/// Validate the project's state tree, then drive the loop to a natural
/// stop or a defined halt.
pub fn run(store: &StateStore, config: &Config) -> Result<(), LoopError> {
    validate_state_directories(store)?;
    store.load_goals()?;
    store.load_sources()?;

    let max_retries_per_task = config.max_retries_per_task.min(MAX_RETRIES_CLAMP);
    if config.max_retries_per_task > max_retries_per_task {
        warn!(
            "max_retries_per_task={} exceeds safety limit; clamped to {}.",
            config.max_retries_per_task, max_retries_per_task
        );
    }
    let mut tracker = RetryTracker::new(max_retries_per_task, config.max_consecutive_failures);
    let planner = Planner::new(store);

    run_loop(store, &planner, config, &mut tracker)
}

fn run_loop(
    store: &StateStore,
    planner: &Planner<'_>,
    config: &Config,
    tracker: &mut RetryTracker,
) -> Result<(), LoopError> {
    loop {
        if store.has_active_task() {
            return Err(LoopError::Stop(
                "ACTIVE_TASK.yaml exists; manual intervention required.".to_string(),
            ));
        }

        let mut plan = planner.ensure_plan()?;
        let Some(task_id) = planner.select_next_task(&plan)? else {
            info!("No pending tasks available. Stopping.");
            planner.write_progress(&plan)?;
            return Ok(());
        };

        let active = planner.activate_task(&mut plan, &task_id, config.task_timeout_seconds)?;
        store.write_plan(&plan)?;
        planner.write_progress(&plan)?;
        store.write_active_task(&active)?;
        info!("Activated task {task_id}.");

        let client = AgentClient::new(
            &config.agent_command,
            config.startup_timeout_seconds,
            config.task_timeout_seconds,
        )?;
        let request = json!({ "task": active });
        let response = match client.run_task(&request) {
            Ok(response) => response,
            // The lock file stays on disk: it is the crash marker that
            // gates the next run.
            Err(AgentError::Timeout(message)) => return Err(LoopError::Stop(message)),
            Err(err) => return Err(err.into()),
        };

        store.clear_active_task()?;
        let stderr = response.stderr.trim();
        if !stderr.is_empty() {
            warn!("Agent stderr: {stderr}");
        }
        store.write_last_result(&response.payload)?;

        shep_policy::check_files_changed(
            response.payload.get("files_changed"),
            store.project_root(),
            store.design_dir(),
            store.state_dir(),
        )?;

        let status = response.payload.get("status").and_then(Value::as_str);
        info!(
            "Agent returned status {} for task {task_id}.",
            status.unwrap_or("<missing>")
        );
        match status {
            Some("success") => {
                planner.finalize_task(&mut plan, &task_id, TaskStatus::Done)?;
                tracker.record_success(&task_id);
                append_summary(planner, &task_id, "success", &response.payload)?;
                store.write_plan(&plan)?;
                planner.write_progress(&plan)?;
            }
            Some("blocked") => {
                planner.finalize_task(&mut plan, &task_id, TaskStatus::Blocked)?;
                store.write_plan(&plan)?;
                planner.write_progress(&plan)?;
                append_summary(planner, &task_id, "blocked", &response.payload)?;
                return Err(LoopError::Stop("Agent reported blocked.".to_string()));
            }
            Some("failed") => {
                tracker.record_failure(&task_id);
                // The consecutive ceiling is checked before any reset so
                // the ceiling stays authoritative over the retry budget.
                if tracker.too_many_consecutive_failures() {
                    return Err(LoopError::Stop(
                        "Max consecutive failures reached.".to_string(),
                    ));
                }
                if tracker.can_retry(&task_id) {
                    planner.reset_task_for_retry(&mut plan, &task_id)?;
                    store.write_plan(&plan)?;
                    planner.write_progress(&plan)?;
                    append_summary(planner, &task_id, "failed", &response.payload)?;
                    continue;
                }
                planner.finalize_task(&mut plan, &task_id, TaskStatus::Failed)?;
                store.write_plan(&plan)?;
                planner.write_progress(&plan)?;
                append_summary(planner, &task_id, "failed", &response.payload)?;
                return Err(LoopError::Stop("Task failed more than once.".to_string()));
            }
            other => {
                return Err(LoopError::Stop(format!(
                    "Unexpected agent status: {}",
                    other.unwrap_or("<missing>")
                )));
            }
        }
    }
}

fn validate_state_directories(store: &StateStore) -> Result<(), LoopError> {
    if !store.state_dir().exists() {
        return Err(LoopError::State(shep_state::StateError::Missing(format!(
            "State directory missing: {}",
            store.state_dir().display()
        ))));
    }
    if !store.design_dir().exists() {
        return Err(LoopError::State(shep_state::StateError::Missing(format!(
            "Design directory missing: {}",
            store.design_dir().display()
        ))));
    }
    Ok(())
}

fn append_summary(
    planner: &Planner<'_>,
    task_id: &str,
    status: &str,
    payload: &Value,
) -> Result<(), LoopError> {
    let files_changed = payload
        .get("files_changed")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let tests_run = payload
        .get("tests_run")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let notes = payload.get("notes").and_then(Value::as_str).unwrap_or("");
    let entry = format!(
        "Task {task_id}: {status}\nFiles changed: {files_changed}\nTests run: {tests_run}\nNotes: {notes}"
    );
    planner.append_summary(&entry)?;
    Ok(())
}
