// error.rs — The halt taxonomy for a shepherd run.

use thiserror::Error;

use shep_agent::AgentError;
use shep_planner::PlannerError;
use shep_policy::PolicyError;
use shep_state::StateError;

/// Everything that can end a shepherd run.
///
/// `Stop` is control flow, not failure: the loop requests an orderly halt
/// and the top level logs it and exits cleanly. Every other variant is
/// fatal to the run — there is no in-loop recovery beyond the explicit
/// retry path for `failed` agent results.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Orderly halt with a human-readable cause.
    #[error("{0}")]
    Stop(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}
