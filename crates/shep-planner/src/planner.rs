// planner.rs — Pure plan operations plus their persistence hooks.
//
// Selection is strictly document order. A task is eligible when it is
// `pending` and every task in its `depends_on` list is `done`. Finding an
// `active` task during selection means a previous run died while a task
// was in flight; the planner refuses to continue.

use std::collections::HashMap;

use tracing::debug;

use shep_state::{ActiveTask, ObjectiveStatus, Plan, Progress, StateStore, Task, TaskStatus};

use crate::error::PlannerError;

const SUMMARY_HEADER: &str = "# Execution Summary\n\n(No execution has occurred yet.)\n\n";

/// Deterministic planner over the persisted plan.
pub struct Planner<'a> {
    store: &'a StateStore,
}

impl<'a> Planner<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Planner { store }
    }

    /// Load the plan, materializing and persisting the minimal empty plan
    /// if no plan file exists yet.
    pub fn ensure_plan(&self) -> Result<Plan, PlannerError> {
        if !self.store.plan_path().exists() {
            let plan = Plan::empty();
            self.store.write_plan(&plan)?;
            return Ok(plan);
        }
        Ok(self.store.load_plan()?)
    }

    /// Pick the next eligible task id in document order, or `None` when
    /// nothing is runnable.
    pub fn select_next_task(&self, plan: &Plan) -> Result<Option<String>, PlannerError> {
        let statuses = task_status_map(plan)?;
        for task in &plan.tasks {
            match task.status {
                TaskStatus::Active => return Err(PlannerError::ActiveTaskWithoutContext),
                TaskStatus::Pending => {}
                _ => continue,
            }
            if dependencies_satisfied(task, &statuses)? {
                debug!(task_id = %task.id, "selected next task");
                return Ok(Some(task.id.clone()));
            }
        }
        Ok(None)
    }

    /// Mark the task `active` and return its agent-facing projection.
    pub fn activate_task(
        &self,
        plan: &mut Plan,
        task_id: &str,
        timeout_seconds: i64,
    ) -> Result<ActiveTask, PlannerError> {
        let task = find_task_mut(plan, task_id)?;
        task.status = TaskStatus::Active;
        let active = ActiveTask::from_task(task, timeout_seconds);
        refresh_objective_statuses(plan);
        Ok(active)
    }

    /// Record the task's terminal status for this iteration.
    pub fn finalize_task(
        &self,
        plan: &mut Plan,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), PlannerError> {
        let task = find_task_mut(plan, task_id)?;
        task.status = status;
        refresh_objective_statuses(plan);
        Ok(())
    }

    /// Put a failed task back in the queue for one more attempt.
    pub fn reset_task_for_retry(&self, plan: &mut Plan, task_id: &str) -> Result<(), PlannerError> {
        let task = find_task_mut(plan, task_id)?;
        task.status = TaskStatus::Pending;
        refresh_objective_statuses(plan);
        Ok(())
    }

    /// Derive and persist the progress snapshot. Never authoritative.
    pub fn write_progress(&self, plan: &Plan) -> Result<(), PlannerError> {
        let mut progress = Progress::default();
        for objective in &plan.objectives {
            progress
                .objectives
                .insert(objective.id.clone(), objective.status);
        }
        for task in &plan.tasks {
            progress.tasks.insert(task.id.clone(), task.status);
        }
        self.store.write_progress(&progress)?;
        Ok(())
    }

    /// Append one entry to the summary document. A fresh or empty summary
    /// gets the standard header first; every entry ends with a newline.
    pub fn append_summary(&self, entry: &str) -> Result<(), PlannerError> {
        let mut entry = entry.to_string();
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        let existing = self.store.load_summary()?;
        let content = if existing.trim().is_empty() {
            format!("{SUMMARY_HEADER}{entry}")
        } else {
            format!("{}\n\n{entry}", existing.trim_end())
        };
        self.store.write_summary(&content)?;
        Ok(())
    }
}

fn task_status_map(plan: &Plan) -> Result<HashMap<&str, TaskStatus>, PlannerError> {
    let mut statuses: HashMap<&str, TaskStatus> = HashMap::with_capacity(plan.tasks.len());
    for task in &plan.tasks {
        if task.id.is_empty() {
            return Err(PlannerError::EmptyTaskId);
        }
        if statuses.insert(task.id.as_str(), task.status).is_some() {
            return Err(PlannerError::DuplicateTaskId(task.id.clone()));
        }
    }
    Ok(statuses)
}

fn dependencies_satisfied(
    task: &Task,
    statuses: &HashMap<&str, TaskStatus>,
) -> Result<bool, PlannerError> {
    for dependency in task.depends_on.iter().flatten() {
        match statuses.get(dependency.as_str()) {
            None => return Err(PlannerError::DependencyNotFound(dependency.clone())),
            Some(TaskStatus::Done) => {}
            Some(_) => return Ok(false),
        }
    }
    Ok(true)
}

fn find_task_mut<'p>(plan: &'p mut Plan, task_id: &str) -> Result<&'p mut Task, PlannerError> {
    plan.tasks
        .iter_mut()
        .find(|task| task.id == task_id)
        .ok_or_else(|| PlannerError::TaskNotFound(task_id.to_string()))
}

/// Objective status is a pure rollup of its related tasks: all `done` is
/// `complete`; any task past `pending` makes it `in_progress`; objectives
/// with no related tasks keep their prior status.
fn refresh_objective_statuses(plan: &mut Plan) {
    let mut related: HashMap<&str, Vec<TaskStatus>> = HashMap::new();
    for task in &plan.tasks {
        related
            .entry(task.objective.as_str())
            .or_default()
            .push(task.status);
    }

    for objective in &mut plan.objectives {
        let Some(statuses) = related.get(objective.id.as_str()) else {
            continue;
        };
        objective.status = rollup(statuses);
    }
}

fn rollup(statuses: &[TaskStatus]) -> ObjectiveStatus {
    if statuses.iter().all(|status| *status == TaskStatus::Done) {
        return ObjectiveStatus::Complete;
    }
    let started = statuses.iter().any(|status| {
        matches!(
            status,
            TaskStatus::Active | TaskStatus::Done | TaskStatus::Failed | TaskStatus::Blocked
        )
    });
    if started {
        ObjectiveStatus::InProgress
    } else {
        ObjectiveStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shep_state::Objective;
    use std::fs;
    use tempfile::TempDir;

    fn task(id: &str, objective: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            objective: objective.to_string(),
            derived_from: "design/plan.md".to_string(),
            status,
            depends_on: None,
            scope: None,
            success_criteria: None,
        }
    }

    fn objective(id: &str, status: ObjectiveStatus) -> Objective {
        Objective {
            id: id.to_string(),
            source: "GOALS.md".to_string(),
            status,
        }
    }

    fn plan(objectives: Vec<Objective>, tasks: Vec<Task>) -> Plan {
        Plan {
            version: 1,
            objectives,
            tasks,
        }
    }

    fn project() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ai")).unwrap();
        fs::create_dir_all(dir.path().join("design")).unwrap();
        let config = json!({
            "agent": {"command": "true", "startup_timeout_seconds": 0},
            "execution": {
                "task_timeout_seconds": 60,
                "max_retries_per_task": 1,
                "max_consecutive_failures": 3,
                "one_task_at_a_time": true,
            },
            "paths": {"design_dir": "design", "state_dir": "ai"},
            "validation": {"strict_schema_validation": true, "json_subset_only": true},
            "logging": {"level": "info", "log_file": "shepherd.log"},
        });
        fs::write(
            dir.path().join("ai/config.json"),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
        let bootstrap = StateStore::bootstrap(dir.path()).unwrap();
        let loaded = bootstrap.load_config().unwrap();
        let store =
            StateStore::for_config(dir.path(), &loaded, bootstrap.config_path().to_path_buf())
                .unwrap();
        (dir, store)
    }

    #[test]
    fn ensure_plan_materializes_the_minimal_plan() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);

        let plan = planner.ensure_plan().unwrap();
        assert_eq!(plan, Plan::empty());
        assert!(store.plan_path().exists());

        // Second call loads the persisted plan instead of rewriting it.
        assert_eq!(planner.ensure_plan().unwrap(), plan);
    }

    #[test]
    fn selection_is_document_order() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let plan = plan(
            vec![],
            vec![
                task("t1", "o1", TaskStatus::Done),
                task("t2", "o1", TaskStatus::Pending),
                task("t3", "o1", TaskStatus::Pending),
            ],
        );
        assert_eq!(
            planner.select_next_task(&plan).unwrap(),
            Some("t2".to_string())
        );
    }

    #[test]
    fn unsatisfied_dependencies_are_skipped() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut blocked = task("t2", "o1", TaskStatus::Pending);
        blocked.depends_on = Some(vec!["t1".to_string()]);
        let plan = plan(
            vec![],
            vec![
                task("t1", "o1", TaskStatus::Failed),
                blocked,
                task("t3", "o1", TaskStatus::Pending),
            ],
        );
        assert_eq!(
            planner.select_next_task(&plan).unwrap(),
            Some("t3".to_string())
        );
    }

    #[test]
    fn satisfied_dependencies_unlock_a_task() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut gated = task("t2", "o1", TaskStatus::Pending);
        gated.depends_on = Some(vec!["t1".to_string()]);
        let plan = plan(vec![], vec![task("t1", "o1", TaskStatus::Done), gated]);
        assert_eq!(
            planner.select_next_task(&plan).unwrap(),
            Some("t2".to_string())
        );
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut dangling = task("t1", "o1", TaskStatus::Pending);
        dangling.depends_on = Some(vec!["ghost".to_string()]);
        let plan = plan(vec![], vec![dangling]);
        assert!(matches!(
            planner.select_next_task(&plan),
            Err(PlannerError::DependencyNotFound(_))
        ));
    }

    #[test]
    fn active_task_in_plan_is_an_error() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let plan = plan(vec![], vec![task("t1", "o1", TaskStatus::Active)]);
        assert!(matches!(
            planner.select_next_task(&plan),
            Err(PlannerError::ActiveTaskWithoutContext)
        ));
    }

    #[test]
    fn duplicate_task_ids_are_an_error() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let plan = plan(
            vec![],
            vec![
                task("t1", "o1", TaskStatus::Pending),
                task("t1", "o1", TaskStatus::Pending),
            ],
        );
        assert!(matches!(
            planner.select_next_task(&plan),
            Err(PlannerError::DuplicateTaskId(_))
        ));
    }

    #[test]
    fn exhausted_plan_selects_nothing() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let plan = plan(
            vec![],
            vec![
                task("t1", "o1", TaskStatus::Done),
                task("t2", "o1", TaskStatus::Blocked),
            ],
        );
        assert_eq!(planner.select_next_task(&plan).unwrap(), None);
    }

    #[test]
    fn activation_projects_the_timeout() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut p = plan(
            vec![objective("o1", ObjectiveStatus::Pending)],
            vec![task("t1", "o1", TaskStatus::Pending)],
        );
        let active = planner.activate_task(&mut p, "t1", 300).unwrap();
        assert_eq!(active.id, "t1");
        assert_eq!(active.timeout_seconds, 300);
        assert_eq!(p.tasks[0].status, TaskStatus::Active);
        assert_eq!(p.objectives[0].status, ObjectiveStatus::InProgress);
    }

    #[test]
    fn finalize_rolls_objectives_to_complete() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut p = plan(
            vec![objective("o1", ObjectiveStatus::InProgress)],
            vec![
                task("t1", "o1", TaskStatus::Done),
                task("t2", "o1", TaskStatus::Active),
            ],
        );
        planner.finalize_task(&mut p, "t2", TaskStatus::Done).unwrap();
        assert_eq!(p.objectives[0].status, ObjectiveStatus::Complete);
    }

    #[test]
    fn reset_returns_a_task_to_pending() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut p = plan(
            vec![objective("o1", ObjectiveStatus::Pending)],
            vec![task("t1", "o1", TaskStatus::Active)],
        );
        planner.reset_task_for_retry(&mut p, "t1").unwrap();
        assert_eq!(p.tasks[0].status, TaskStatus::Pending);
        assert_eq!(p.objectives[0].status, ObjectiveStatus::Pending);
    }

    #[test]
    fn unknown_task_id_is_an_error() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut p = plan(vec![], vec![]);
        assert!(matches!(
            planner.finalize_task(&mut p, "ghost", TaskStatus::Done),
            Err(PlannerError::TaskNotFound(_))
        ));
    }

    #[test]
    fn objectives_without_tasks_keep_their_status() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let mut p = plan(
            vec![
                objective("o1", ObjectiveStatus::Pending),
                objective("orphan", ObjectiveStatus::Complete),
            ],
            vec![task("t1", "o1", TaskStatus::Pending)],
        );
        planner.activate_task(&mut p, "t1", 60).unwrap();
        assert_eq!(p.objectives[0].status, ObjectiveStatus::InProgress);
        assert_eq!(p.objectives[1].status, ObjectiveStatus::Complete);
    }

    #[test]
    fn progress_snapshot_mirrors_the_plan() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        let p = plan(
            vec![objective("o1", ObjectiveStatus::Pending)],
            vec![
                task("t1", "o1", TaskStatus::Done),
                task("t2", "o1", TaskStatus::Pending),
            ],
        );
        planner.write_progress(&p).unwrap();

        let progress = store.load_progress().unwrap();
        assert_eq!(
            progress.objectives.get("o1"),
            Some(&ObjectiveStatus::Pending)
        );
        assert_eq!(progress.tasks.get("t1"), Some(&TaskStatus::Done));
        assert_eq!(progress.tasks.get("t2"), Some(&TaskStatus::Pending));
    }

    #[test]
    fn summary_gets_header_then_appends() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);

        planner.append_summary("Task t1: success").unwrap();
        let first = store.load_summary().unwrap();
        assert_eq!(
            first,
            "# Execution Summary\n\n(No execution has occurred yet.)\n\nTask t1: success\n"
        );

        planner.append_summary("Task t2: failed\nNotes: flaky").unwrap();
        let second = store.load_summary().unwrap();
        assert!(second.starts_with("# Execution Summary\n"));
        assert!(second.ends_with("Task t2: failed\nNotes: flaky\n"));
        assert!(second.contains("Task t1: success\n\nTask t2: failed"));
    }

    #[test]
    fn whitespace_only_summary_is_rewritten_with_header() {
        let (_dir, store) = project();
        let planner = Planner::new(&store);
        store.write_summary("   \n\n").unwrap();

        planner.append_summary("Task t1: success").unwrap();
        let content = store.load_summary().unwrap();
        assert!(content.starts_with("# Execution Summary\n"));
    }
}
