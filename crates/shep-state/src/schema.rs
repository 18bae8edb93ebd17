// schema.rs — JSON-subset validators for mutable state artifacts.
//
// Every artifact the shepherd persists is a closed JSON object: required
// keys must be present, unknown keys are rejected, and each field has one
// permitted type. Validation errors carry a dotted context path
// (e.g. `plan.tasks[3].depends_on[1]`) so a hand-edited plan file can be
// fixed without guesswork.
//
// Booleans are never accepted where integers are required; `true` is not 1.

use serde_json::{Map, Value};

use crate::error::StateError;

/// Legal objective statuses.
pub const OBJECTIVE_STATUSES: &[&str] = &["pending", "in_progress", "complete"];

/// Legal task statuses.
pub const TASK_STATUSES: &[&str] = &["pending", "active", "done", "failed", "blocked"];

/// Legal agent result statuses.
pub const AGENT_RESULT_STATUSES: &[&str] = &["success", "failed", "blocked"];

const TASK_REQUIRED: &[&str] = &["id", "objective", "derived_from", "status"];
const TASK_ALLOWED: &[&str] = &[
    "id",
    "objective",
    "derived_from",
    "status",
    "depends_on",
    "scope",
    "success_criteria",
];

/// Validate a full plan document.
pub fn validate_plan(plan: &Value) -> Result<(), StateError> {
    let map = require_object(plan, "plan")?;
    require_keys(map, &["version", "objectives", "tasks"], "plan")?;
    reject_extra_keys(map, &["version", "objectives", "tasks"], "plan")?;
    require_int(&map["version"], "plan.version")?;

    let objectives = require_list(&map["objectives"], "plan.objectives")?;
    for (index, item) in objectives.iter().enumerate() {
        validate_objective(item, &format!("plan.objectives[{index}]"))?;
    }

    let tasks = require_list(&map["tasks"], "plan.tasks")?;
    for (index, item) in tasks.iter().enumerate() {
        validate_task(item, &format!("plan.tasks[{index}]"))?;
    }
    Ok(())
}

fn validate_objective(obj: &Value, context: &str) -> Result<(), StateError> {
    let map = require_object(obj, context)?;
    require_keys(map, &["id", "source", "status"], context)?;
    reject_extra_keys(map, &["id", "source", "status"], context)?;
    require_string(&map["id"], &format!("{context}.id"))?;
    require_string(&map["source"], &format!("{context}.source"))?;
    require_enum(&map["status"], OBJECTIVE_STATUSES, &format!("{context}.status"))?;
    Ok(())
}

fn validate_task(task: &Value, context: &str) -> Result<(), StateError> {
    let map = require_object(task, context)?;
    require_keys(map, TASK_REQUIRED, context)?;
    reject_extra_keys(map, TASK_ALLOWED, context)?;
    validate_task_fields(map, context)
}

fn validate_task_fields(map: &Map<String, Value>, context: &str) -> Result<(), StateError> {
    require_string(&map["id"], &format!("{context}.id"))?;
    require_string(&map["objective"], &format!("{context}.objective"))?;
    require_string(&map["derived_from"], &format!("{context}.derived_from"))?;
    require_enum(&map["status"], TASK_STATUSES, &format!("{context}.status"))?;

    for key in ["depends_on", "scope", "success_criteria"] {
        if let Some(value) = map.get(key) {
            require_string_list(value, &format!("{context}.{key}"))?;
        }
    }
    Ok(())
}

/// Validate an active-task document: a task plus `timeout_seconds`.
pub fn validate_active_task(task: &Value) -> Result<(), StateError> {
    let context = "active_task";
    let map = require_object(task, context)?;
    let required = ["id", "objective", "derived_from", "status", "timeout_seconds"];
    let allowed = [
        "id",
        "objective",
        "derived_from",
        "status",
        "timeout_seconds",
        "depends_on",
        "scope",
        "success_criteria",
    ];
    require_keys(map, &required, context)?;
    reject_extra_keys(map, &allowed, context)?;
    validate_task_fields(map, context)?;
    require_int(&map["timeout_seconds"], "active_task.timeout_seconds")?;
    Ok(())
}

/// Validate an agent result document.
pub fn validate_agent_result(result: &Value) -> Result<(), StateError> {
    let context = "agent_result";
    let map = require_object(result, context)?;
    let keys = ["status", "files_changed", "tests_run", "notes"];
    require_keys(map, &keys, context)?;
    reject_extra_keys(map, &keys, context)?;
    require_enum(&map["status"], AGENT_RESULT_STATUSES, "agent_result.status")?;
    require_string_list(&map["files_changed"], "agent_result.files_changed")?;
    require_string_list(&map["tests_run"], "agent_result.tests_run")?;
    require_string(&map["notes"], "agent_result.notes")?;
    Ok(())
}

// ── Primitive validators ────────────────────────────────────────

pub(crate) fn require_object<'a>(
    value: &'a Value,
    context: &str,
) -> Result<&'a Map<String, Value>, StateError> {
    value
        .as_object()
        .ok_or_else(|| StateError::Validation(format!("{context} must be an object.")))
}

pub(crate) fn require_list<'a>(value: &'a Value, context: &str) -> Result<&'a [Value], StateError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| StateError::Validation(format!("{context} must be an array.")))
}

pub(crate) fn require_keys(
    map: &Map<String, Value>,
    required: &[&str],
    context: &str,
) -> Result<(), StateError> {
    let mut missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    Err(StateError::Validation(format!(
        "{context} is missing required keys: {}",
        missing.join(", ")
    )))
}

pub(crate) fn reject_extra_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    context: &str,
) -> Result<(), StateError> {
    let mut extra: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|key| !allowed.contains(key))
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort_unstable();
    Err(StateError::Validation(format!(
        "{context} has unexpected keys: {}",
        extra.join(", ")
    )))
}

pub(crate) fn require_int(value: &Value, context: &str) -> Result<i64, StateError> {
    // serde_json keeps booleans and numbers as distinct variants, so
    // `true` can never satisfy an integer field here.
    value
        .as_i64()
        .ok_or_else(|| StateError::Validation(format!("{context} must be an integer.")))
}

pub(crate) fn require_string<'a>(value: &'a Value, context: &str) -> Result<&'a str, StateError> {
    value
        .as_str()
        .ok_or_else(|| StateError::Validation(format!("{context} must be a string.")))
}

pub(crate) fn require_bool(value: &Value, context: &str) -> Result<bool, StateError> {
    value
        .as_bool()
        .ok_or_else(|| StateError::Validation(format!("{context} must be a boolean.")))
}

pub(crate) fn require_string_list(value: &Value, context: &str) -> Result<(), StateError> {
    let items = require_list(value, context)?;
    for (index, item) in items.iter().enumerate() {
        if !item.is_string() {
            return Err(StateError::Validation(format!(
                "{context}[{index}] must be a string."
            )));
        }
    }
    Ok(())
}

pub(crate) fn require_enum(
    value: &Value,
    allowed: &[&str],
    context: &str,
) -> Result<(), StateError> {
    let text = require_string(value, context)?;
    if allowed.contains(&text) {
        return Ok(());
    }
    let mut sorted = allowed.to_vec();
    sorted.sort_unstable();
    Err(StateError::Validation(format!(
        "{context} must be one of: {}",
        sorted.join(", ")
    )))
}

pub(crate) fn require_non_negative(value: i64, context: &str) -> Result<(), StateError> {
    if value < 0 {
        return Err(StateError::Validation(format!(
            "{context} must be non-negative."
        )));
    }
    Ok(())
}

pub(crate) fn require_positive(value: i64, context: &str) -> Result<(), StateError> {
    if value <= 0 {
        return Err(StateError::Validation(format!(
            "{context} must be greater than zero."
        )));
    }
    Ok(())
}

pub(crate) fn require_non_empty(value: &str, context: &str) -> Result<(), StateError> {
    if value.trim().is_empty() {
        return Err(StateError::Validation(format!(
            "{context} must be non-empty."
        )));
    }
    Ok(())
}
