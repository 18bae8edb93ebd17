// error.rs — Planner errors for ambiguous or malformed planning state.

use thiserror::Error;

use shep_state::StateError;

/// Errors raised while selecting or mutating plan tasks.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The plan contains an `active` task but no agent is running. A
    /// crashed run left the plan behind; manual repair is required.
    #[error("plan contains an active task without execution context")]
    ActiveTaskWithoutContext,

    /// Two tasks share the same id.
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    /// A task id is empty.
    #[error("task id must be a non-empty string")]
    EmptyTaskId,

    /// A `depends_on` entry names a task that does not exist.
    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    /// The requested task id is not in the plan.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Persistence failed underneath a planner operation.
    #[error(transparent)]
    State(#[from] StateError),
}
