//! # shep-planner
//!
//! Deterministic planning over the persisted plan.
//!
//! The planner owns no schedule of its own: task selection is strictly
//! document order, and objective status is a pure function of the related
//! tasks' statuses. The plan file *is* the schedule — there is no
//! priority field and no timestamp, so two runs over the same plan always
//! pick the same task.
//!
//! ## Key components
//!
//! - [`Planner`] — ensure/select/activate/finalize/reset operations plus
//!   the derived progress snapshot and the append-only summary
//! - [`PlannerError`] — malformed-plan failures (duplicate ids, dangling
//!   dependencies, an active task with no execution context)

pub mod error;
pub mod planner;

pub use error::PlannerError;
pub use planner::Planner;
