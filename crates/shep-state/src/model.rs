// model.rs — The plan data model.
//
// A plan is plain data: no behavior beyond construction helpers lives here.
// Status fields are closed enums; the serde renames keep the on-disk form
// identical to what the schema validators accept. Optional task fields
// round-trip as absent (never as `null`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of an objective, derived from its related tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Pending,
    InProgress,
    Complete,
}

/// Status of a task within the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Done,
    Failed,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
        };
        f.write_str(text)
    }
}

/// An objective: a unit of intent that tasks roll up into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Objective {
    pub id: String,
    pub source: String,
    pub status: ObjectiveStatus,
}

/// A single unit of work for the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub id: String,
    pub objective: String,
    pub derived_from: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Vec<String>>,
}

/// The full plan document persisted at `<state_dir>/PLAN.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub version: i64,
    pub objectives: Vec<Objective>,
    pub tasks: Vec<Task>,
}

impl Plan {
    /// The minimal plan written when no plan file exists yet.
    pub fn empty() -> Self {
        Plan {
            version: 1,
            objectives: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// A task projection handed to the agent, persisted as the on-disk lock
/// at `<state_dir>/ACTIVE_TASK.yaml` while the task is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActiveTask {
    pub id: String,
    pub objective: String,
    pub derived_from: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<Vec<String>>,
    pub timeout_seconds: i64,
}

impl ActiveTask {
    /// Project a task into its active form with the configured timeout.
    pub fn from_task(task: &Task, timeout_seconds: i64) -> Self {
        ActiveTask {
            id: task.id.clone(),
            objective: task.objective.clone(),
            derived_from: task.derived_from.clone(),
            status: task.status,
            depends_on: task.depends_on.clone(),
            scope: task.scope.clone(),
            success_criteria: task.success_criteria.clone(),
            timeout_seconds,
        }
    }
}

/// The derived progress snapshot persisted at `<state_dir>/PROGRESS.yaml`.
///
/// Never authoritative — always recomputed from the plan. `BTreeMap` keeps
/// the serialized form deterministic so repeated writes are byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Progress {
    pub objectives: BTreeMap<String, ObjectiveStatus>,
    pub tasks: BTreeMap<String, TaskStatus>,
}
