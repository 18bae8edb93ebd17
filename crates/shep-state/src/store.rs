// store.rs — StateStore: the sole gateway to the on-disk state tree.
//
// Paths are partitioned into a read-only set (config, goals, sources, and
// everything under the design directory) and a writable set (plan,
// active-task, summary, last-result, progress). Writes outside the
// writable set fail before touching the filesystem.
//
// All writes are atomic: payload goes to a fresh temp file in the target's
// directory, then a rename replaces the target. The rename is the commit
// point; a crash beforehand leaves the old file intact, and the temp file
// is unlinked on every failure path.
//
// The state files are YAML-named (`PLAN.yaml` etc.) but hold a JSON
// subset; parsing uses a JSON reader and rejects any top-level value that
// is not an object. This keeps the human-authored inputs trivially
// parseable and diffable.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::Config;
use crate::error::StateError;
use crate::model::{ActiveTask, Plan, Progress};
use crate::schema;

pub const DEFAULT_STATE_DIRNAME: &str = "ai";
pub const DEFAULT_DESIGN_DIRNAME: &str = "design";

pub const CONFIG_FILENAME: &str = "config.json";
pub const GOALS_FILENAME: &str = "GOALS.md";
pub const SOURCES_FILENAME: &str = "SOURCES.yaml";
pub const PLAN_FILENAME: &str = "PLAN.yaml";
pub const ACTIVE_TASK_FILENAME: &str = "ACTIVE_TASK.yaml";
pub const SUMMARY_FILENAME: &str = "SUMMARY.md";
pub const LAST_RESULT_FILENAME: &str = "LAST_RESULT.json";
pub const PROGRESS_FILENAME: &str = "PROGRESS.yaml";

/// File-backed state access rooted at a target project.
#[derive(Debug)]
pub struct StateStore {
    project_root: PathBuf,
    state_dir: PathBuf,
    design_dir: PathBuf,
    config_path: PathBuf,
    goals_path: PathBuf,
    sources_path: PathBuf,
    plan_path: PathBuf,
    active_task_path: PathBuf,
    summary_path: PathBuf,
    last_result_path: PathBuf,
    progress_path: PathBuf,
    strict_schema_validation: bool,
}

impl StateStore {
    /// Open a store with the default layout. Used at startup to read
    /// `ai/config.json` before the configured layout is known.
    pub fn bootstrap(project_root: impl AsRef<Path>) -> Result<Self, StateError> {
        Self::with_layout(
            project_root.as_ref(),
            DEFAULT_STATE_DIRNAME,
            DEFAULT_DESIGN_DIRNAME,
            None,
            true,
        )
    }

    /// Open the real store for a loaded config. `config_path` pins the
    /// bootstrap location of `config.json` as read-only even when the
    /// configured state dir differs from the default.
    pub fn for_config(
        project_root: impl AsRef<Path>,
        config: &Config,
        config_path: PathBuf,
    ) -> Result<Self, StateError> {
        Self::with_layout(
            project_root.as_ref(),
            &config.state_dir,
            &config.design_dir,
            Some(config_path),
            config.strict_schema_validation,
        )
    }

    fn with_layout(
        project_root: &Path,
        state_dirname: &str,
        design_dirname: &str,
        config_path: Option<PathBuf>,
        strict_schema_validation: bool,
    ) -> Result<Self, StateError> {
        let root = fs::canonicalize(project_root).map_err(|_| {
            StateError::Missing(format!(
                "Project root does not exist: {}",
                project_root.display()
            ))
        })?;
        let state_dir = root.join(state_dirname);
        let design_dir = root.join(design_dirname);
        let config_path = normalize_lexically(
            &config_path
                .unwrap_or_else(|| root.join(DEFAULT_STATE_DIRNAME).join(CONFIG_FILENAME)),
        );

        Ok(StateStore {
            goals_path: state_dir.join(GOALS_FILENAME),
            sources_path: state_dir.join(SOURCES_FILENAME),
            plan_path: state_dir.join(PLAN_FILENAME),
            active_task_path: state_dir.join(ACTIVE_TASK_FILENAME),
            summary_path: state_dir.join(SUMMARY_FILENAME),
            last_result_path: state_dir.join(LAST_RESULT_FILENAME),
            progress_path: state_dir.join(PROGRESS_FILENAME),
            project_root: root,
            state_dir,
            design_dir,
            config_path,
            strict_schema_validation,
        })
    }

    // ── Path partitioning ───────────────────────────────────────

    /// True when the given path may never be written by the shepherd.
    pub fn is_read_only_path(&self, path: &Path) -> bool {
        let resolved = self.resolve(path);
        resolved == self.config_path
            || resolved == self.goals_path
            || resolved == self.sources_path
            || resolved.starts_with(&self.design_dir)
    }

    /// True when the given path is one of the five writable artifacts.
    pub fn is_writable_path(&self, path: &Path) -> bool {
        let resolved = self.resolve(path);
        [
            &self.plan_path,
            &self.active_task_path,
            &self.summary_path,
            &self.last_result_path,
            &self.progress_path,
        ]
        .iter()
        .any(|known| resolved == **known)
    }

    /// Refuse writes to read-only or unknown paths.
    pub fn ensure_writable(&self, path: &Path) -> Result<(), StateError> {
        let resolved = self.resolve(path);
        if self.is_read_only_path(&resolved) {
            return Err(StateError::ReadOnly { path: resolved });
        }
        if !self.is_writable_path(&resolved) {
            return Err(StateError::UnknownPath { path: resolved });
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&self.project_root.join(path))
        }
    }

    // ── Loads ───────────────────────────────────────────────────

    /// Load and validate `config.json`.
    pub fn load_config(&self) -> Result<Config, StateError> {
        let value = read_json_object(&self.config_path)?;
        Config::from_value(&value)
    }

    /// Load the narrative goals file (read-only).
    pub fn load_goals(&self) -> Result<String, StateError> {
        read_text(&self.goals_path)
    }

    /// Load the sources file (read-only, JSON subset).
    pub fn load_sources(&self) -> Result<Value, StateError> {
        read_json_object(&self.sources_path)
    }

    /// Load and validate the plan.
    pub fn load_plan(&self) -> Result<Plan, StateError> {
        let value = read_json_object(&self.plan_path)?;
        if self.strict_schema_validation {
            schema::validate_plan(&value)?;
        }
        serde_json::from_value(value)
            .map_err(|err| StateError::Validation(format!("plan: {err}")))
    }

    /// Load and validate the active-task lock file.
    pub fn load_active_task(&self) -> Result<ActiveTask, StateError> {
        let value = read_json_object(&self.active_task_path)?;
        if self.strict_schema_validation {
            schema::validate_active_task(&value)?;
        }
        serde_json::from_value(value)
            .map_err(|err| StateError::Validation(format!("active_task: {err}")))
    }

    /// Load the last agent result, or `None` if no agent has run yet.
    pub fn load_last_result(&self) -> Result<Option<Value>, StateError> {
        if !self.last_result_path.exists() {
            return Ok(None);
        }
        let value = read_json_object(&self.last_result_path)?;
        if self.strict_schema_validation {
            schema::validate_agent_result(&value)?;
        }
        Ok(Some(value))
    }

    /// Load the summary document, or an empty string if absent.
    pub fn load_summary(&self) -> Result<String, StateError> {
        if !self.summary_path.exists() {
            return Ok(String::new());
        }
        read_text(&self.summary_path)
    }

    /// Load the progress snapshot, or the empty snapshot if absent.
    pub fn load_progress(&self) -> Result<Progress, StateError> {
        if !self.progress_path.exists() {
            return Ok(Progress::default());
        }
        let value = read_json_object(&self.progress_path)?;
        serde_json::from_value(value)
            .map_err(|err| StateError::Validation(format!("progress: {err}")))
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Atomically write the plan, validating first under strict mode.
    pub fn write_plan(&self, plan: &Plan) -> Result<(), StateError> {
        let value = to_value(plan, &self.plan_path)?;
        if self.strict_schema_validation {
            schema::validate_plan(&value)?;
        }
        self.write_json(&self.plan_path, &value)
    }

    /// Atomically write the active-task lock file.
    pub fn write_active_task(&self, task: &ActiveTask) -> Result<(), StateError> {
        let value = to_value(task, &self.active_task_path)?;
        if self.strict_schema_validation {
            schema::validate_active_task(&value)?;
        }
        self.write_json(&self.active_task_path, &value)
    }

    /// Atomically write the summary document.
    pub fn write_summary(&self, content: &str) -> Result<(), StateError> {
        self.write_text(&self.summary_path, content)
    }

    /// Atomically write the last agent result, validating first under
    /// strict mode. The payload arrives from the wire as a JSON object.
    pub fn write_last_result(&self, result: &Value) -> Result<(), StateError> {
        if !result.is_object() {
            return Err(StateError::Validation(
                "agent_result must be an object.".to_string(),
            ));
        }
        if self.strict_schema_validation {
            schema::validate_agent_result(result)?;
        }
        self.write_json(&self.last_result_path, result)
    }

    /// Atomically write the derived progress snapshot.
    pub fn write_progress(&self, progress: &Progress) -> Result<(), StateError> {
        let value = to_value(progress, &self.progress_path)?;
        self.write_json(&self.progress_path, &value)
    }

    /// Remove the active-task lock file if present; no-op otherwise.
    pub fn clear_active_task(&self) -> Result<(), StateError> {
        if !self.active_task_path.exists() {
            return Ok(());
        }
        self.ensure_writable(&self.active_task_path)?;
        fs::remove_file(&self.active_task_path)
            .map_err(|err| StateError::io(&self.active_task_path, err))
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<(), StateError> {
        let mut text = serde_json::to_string_pretty(value)
            .map_err(|err| StateError::Validation(format!("{}: {err}", path.display())))?;
        text.push('\n');
        self.write_text(path, &text)
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<(), StateError> {
        self.ensure_writable(path)?;
        atomic_write_bytes(path, content.as_bytes())?;
        debug!(path = %path.display(), bytes = content.len(), "state write committed");
        Ok(())
    }

    // ── Path accessors ──────────────────────────────────────────

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn design_dir(&self) -> &Path {
        &self.design_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    pub fn active_task_path(&self) -> &Path {
        &self.active_task_path
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    /// True when the active-task lock file exists on disk.
    pub fn has_active_task(&self) -> bool {
        self.active_task_path.exists()
    }
}

fn read_text(path: &Path) -> Result<String, StateError> {
    fs::read_to_string(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            StateError::Missing(format!("Missing required state file: {}", path.display()))
        } else {
            StateError::io(path, err)
        }
    })
}

fn read_json_object(path: &Path) -> Result<Value, StateError> {
    let text = read_text(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|err| {
        StateError::Validation(format!(
            "{} must contain JSON (YAML-compatible) object data: {err}",
            path.display()
        ))
    })?;
    if !value.is_object() {
        return Err(StateError::Validation(format!(
            "{} must contain a JSON object.",
            path.display()
        )));
    }
    Ok(value)
}

fn to_value<T: serde::Serialize>(value: &T, path: &Path) -> Result<Value, StateError> {
    serde_json::to_value(value)
        .map_err(|err| StateError::Validation(format!("{}: {err}", path.display())))
}

/// Write-temp-then-rename. The rename is the commit point; `NamedTempFile`
/// unlinks the temp file on every failure path via its drop guard.
fn atomic_write_bytes(path: &Path, payload: &[u8]) -> Result<(), StateError> {
    let dir = path
        .parent()
        .ok_or_else(|| StateError::Missing(format!("Missing parent directory for {}", path.display())))?;
    if !dir.exists() {
        return Err(StateError::Missing(format!(
            "Missing parent directory for {}",
            path.display()
        )));
    }
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| StateError::io(dir, err))?;
    tmp.write_all(payload)
        .map_err(|err| StateError::io(path, err))?;
    tmp.flush().map_err(|err| StateError::io(path, err))?;
    tmp.persist(path)
        .map_err(|err| StateError::io(path, err.error))?;
    Ok(())
}

/// Fold `.` and `..` components without touching the filesystem. The
/// writable artifacts may not exist yet, so `fs::canonicalize` is not an
/// option here.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Objective, ObjectiveStatus, Task, TaskStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn config_value(state_dir: &str, design_dir: &str) -> Value {
        json!({
            "agent": {"command": "true", "startup_timeout_seconds": 0},
            "execution": {
                "task_timeout_seconds": 60,
                "max_retries_per_task": 1,
                "max_consecutive_failures": 3,
                "one_task_at_a_time": true,
            },
            "paths": {"design_dir": design_dir, "state_dir": state_dir},
            "validation": {"strict_schema_validation": true, "json_subset_only": true},
            "logging": {"level": "info", "log_file": "shepherd.log"},
        })
    }

    fn project_with_dirs(state_dir: &str, design_dir: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(state_dir)).unwrap();
        fs::create_dir_all(dir.path().join(design_dir)).unwrap();
        fs::write(
            dir.path().join("ai").join(CONFIG_FILENAME),
            serde_json::to_string_pretty(&config_value(state_dir, design_dir)).unwrap(),
        )
        .unwrap();
        dir
    }

    fn open_store(dir: &TempDir) -> StateStore {
        let bootstrap = StateStore::bootstrap(dir.path()).unwrap();
        let config = bootstrap.load_config().unwrap();
        StateStore::for_config(dir.path(), &config, bootstrap.config_path().to_path_buf()).unwrap()
    }

    fn sample_plan() -> Plan {
        Plan {
            version: 1,
            objectives: vec![Objective {
                id: "o1".to_string(),
                source: "GOALS.md".to_string(),
                status: ObjectiveStatus::Pending,
            }],
            tasks: vec![Task {
                id: "t1".to_string(),
                objective: "o1".to_string(),
                derived_from: "design/plan.md".to_string(),
                status: TaskStatus::Pending,
                depends_on: None,
                scope: None,
                success_criteria: None,
            }],
        }
    }

    #[test]
    fn missing_project_root_is_reported() {
        let err = StateStore::bootstrap("/does/not/exist/anywhere").unwrap_err();
        assert!(matches!(err, StateError::Missing(_)));
    }

    #[test]
    fn plan_round_trips_through_disk() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        let plan = sample_plan();
        store.write_plan(&plan).unwrap();
        assert_eq!(store.load_plan().unwrap(), plan);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        store.write_plan(&sample_plan()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("ai"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&PLAN_FILENAME.to_string()));
        assert_eq!(names.len(), 2, "only config.json and PLAN.yaml: {names:?}");
    }

    #[test]
    fn read_only_paths_are_refused() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        let goals = dir.path().join("ai").join(GOALS_FILENAME);
        assert!(store.is_read_only_path(&goals));
        assert!(matches!(
            store.ensure_writable(&goals),
            Err(StateError::ReadOnly { .. })
        ));

        let under_design = dir.path().join("design").join("spec.md");
        assert!(store.is_read_only_path(&under_design));
    }

    #[test]
    fn unknown_paths_are_refused() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        let stray = dir.path().join("ai").join("NOTES.md");
        assert!(matches!(
            store.ensure_writable(&stray),
            Err(StateError::UnknownPath { .. })
        ));
    }

    #[test]
    fn write_under_design_dir_leaves_file_untouched() {
        // A layout where the state dir sits inside the design dir makes
        // every writable artifact read-only; the write must fail without
        // altering what is on disk.
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ai")).unwrap();
        fs::create_dir_all(dir.path().join("design").join("ai")).unwrap();
        fs::write(
            dir.path().join("ai").join(CONFIG_FILENAME),
            serde_json::to_string_pretty(&config_value("design/ai", "design")).unwrap(),
        )
        .unwrap();
        let store = open_store(&dir);

        let plan_path = dir.path().join("design").join("ai").join(PLAN_FILENAME);
        fs::write(&plan_path, "original bytes").unwrap();

        let err = store.write_plan(&sample_plan()).unwrap_err();
        assert!(matches!(err, StateError::ReadOnly { .. }));
        assert_eq!(fs::read_to_string(&plan_path).unwrap(), "original bytes");
    }

    #[test]
    fn invalid_last_result_write_leaves_file_untouched() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        let good = json!({
            "status": "success",
            "files_changed": [],
            "tests_run": [],
            "notes": "ok",
        });
        store.write_last_result(&good).unwrap();
        assert_eq!(store.load_last_result().unwrap(), Some(good.clone()));
        let before = fs::read(store.state_dir().join(LAST_RESULT_FILENAME)).unwrap();

        let mut bad = good.clone();
        bad["status"] = json!("exploded");
        assert!(store.write_last_result(&bad).is_err());

        let after = fs::read(store.state_dir().join(LAST_RESULT_FILENAME)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn last_result_absent_is_none() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        assert!(store.load_last_result().unwrap().is_none());
    }

    #[test]
    fn missing_goals_is_missing_state() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        assert!(matches!(store.load_goals(), Err(StateError::Missing(_))));
    }

    #[test]
    fn non_object_top_level_is_rejected() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        fs::write(store.plan_path(), "[1, 2, 3]\n").unwrap();
        let err = store.load_plan().unwrap_err();
        assert!(err.to_string().contains("must contain a JSON object"));
    }

    #[test]
    fn summary_defaults_to_empty() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        assert_eq!(store.load_summary().unwrap(), "");
    }

    #[test]
    fn progress_writes_are_idempotent() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        let mut progress = Progress::default();
        progress
            .tasks
            .insert("t1".to_string(), TaskStatus::Pending);
        store.write_progress(&progress).unwrap();
        let first = fs::read(store.state_dir().join(PROGRESS_FILENAME)).unwrap();
        store.write_progress(&progress).unwrap();
        let second = fs::read(store.state_dir().join(PROGRESS_FILENAME)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn clear_active_task_is_noop_when_absent() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);
        store.clear_active_task().unwrap();

        let task = sample_plan().tasks.remove(0);
        let active = ActiveTask::from_task(&task, 60);
        store.write_active_task(&active).unwrap();
        assert!(store.has_active_task());
        assert_eq!(store.load_active_task().unwrap(), active);
        store.clear_active_task().unwrap();
        assert!(!store.has_active_task());
    }

    #[test]
    fn writable_partition_covers_exactly_the_five_artifacts() {
        let dir = project_with_dirs("ai", "design");
        let store = open_store(&dir);

        for name in [
            PLAN_FILENAME,
            ACTIVE_TASK_FILENAME,
            SUMMARY_FILENAME,
            LAST_RESULT_FILENAME,
            PROGRESS_FILENAME,
        ] {
            let path = store.state_dir().join(name);
            assert!(store.is_writable_path(&path), "{name} should be writable");
            assert!(!store.is_read_only_path(&path));
        }
        assert!(!store.is_writable_path(store.config_path()));
    }
}
