// config.rs — Daemon configuration loaded from `<state_dir>/config.json`.
//
// The config file is a closed JSON object of five sections. It is loaded
// once at startup and never rewritten. Two fields are hard invariants of
// the design and must be literally true: `execution.one_task_at_a_time`
// and `validation.json_subset_only`.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::StateError;
use crate::schema;

/// Log verbosity levels accepted by `logging.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    const ALL: &'static [(&'static str, LogLevel)] = &[
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warning", LogLevel::Warning),
        ("error", LogLevel::Error),
        ("critical", LogLevel::Critical),
    ];

    fn parse(text: &str) -> Result<Self, StateError> {
        let lowered = text.to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, level)| *level)
            .ok_or_else(|| {
                StateError::Validation(
                    "config.logging.level must be one of: critical, debug, error, info, warning"
                        .to_string(),
                )
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent_command: String,
    pub startup_timeout_seconds: i64,
    pub task_timeout_seconds: i64,
    pub max_retries_per_task: u32,
    pub max_consecutive_failures: u32,
    pub one_task_at_a_time: bool,
    pub design_dir: String,
    pub state_dir: String,
    pub strict_schema_validation: bool,
    pub json_subset_only: bool,
    pub log_level: LogLevel,
    pub log_file: String,
}

impl Config {
    /// Parse and validate a config document.
    pub fn from_value(config: &Value) -> Result<Self, StateError> {
        let map = schema::require_object(config, "config")?;
        let sections = ["agent", "execution", "paths", "validation", "logging"];
        schema::require_keys(map, &sections, "config")?;
        schema::reject_extra_keys(map, &sections, "config")?;

        let agent = require_section(map, "agent")?;
        schema::require_keys(agent, &["command", "startup_timeout_seconds"], "config.agent")?;
        schema::reject_extra_keys(agent, &["command", "startup_timeout_seconds"], "config.agent")?;
        let agent_command = schema::require_string(&agent["command"], "config.agent.command")?;
        let startup_timeout_seconds = schema::require_int(
            &agent["startup_timeout_seconds"],
            "config.agent.startup_timeout_seconds",
        )?;
        schema::require_non_negative(
            startup_timeout_seconds,
            "config.agent.startup_timeout_seconds",
        )?;

        let execution = require_section(map, "execution")?;
        let execution_keys = [
            "task_timeout_seconds",
            "max_retries_per_task",
            "max_consecutive_failures",
            "one_task_at_a_time",
        ];
        schema::require_keys(execution, &execution_keys, "config.execution")?;
        schema::reject_extra_keys(execution, &execution_keys, "config.execution")?;
        let task_timeout_seconds = schema::require_int(
            &execution["task_timeout_seconds"],
            "config.execution.task_timeout_seconds",
        )?;
        schema::require_positive(task_timeout_seconds, "config.execution.task_timeout_seconds")?;
        let max_retries_per_task = schema::require_int(
            &execution["max_retries_per_task"],
            "config.execution.max_retries_per_task",
        )?;
        schema::require_non_negative(
            max_retries_per_task,
            "config.execution.max_retries_per_task",
        )?;
        let max_consecutive_failures = schema::require_int(
            &execution["max_consecutive_failures"],
            "config.execution.max_consecutive_failures",
        )?;
        schema::require_positive(
            max_consecutive_failures,
            "config.execution.max_consecutive_failures",
        )?;
        let one_task_at_a_time = schema::require_bool(
            &execution["one_task_at_a_time"],
            "config.execution.one_task_at_a_time",
        )?;
        if !one_task_at_a_time {
            return Err(StateError::Validation(
                "config.execution.one_task_at_a_time must be true.".to_string(),
            ));
        }

        let paths = require_section(map, "paths")?;
        schema::require_keys(paths, &["design_dir", "state_dir"], "config.paths")?;
        schema::reject_extra_keys(paths, &["design_dir", "state_dir"], "config.paths")?;
        let design_dir = schema::require_string(&paths["design_dir"], "config.paths.design_dir")?;
        let state_dir = schema::require_string(&paths["state_dir"], "config.paths.state_dir")?;
        schema::require_non_empty(design_dir, "config.paths.design_dir")?;
        schema::require_non_empty(state_dir, "config.paths.state_dir")?;

        let validation = require_section(map, "validation")?;
        let validation_keys = ["strict_schema_validation", "json_subset_only"];
        schema::require_keys(validation, &validation_keys, "config.validation")?;
        schema::reject_extra_keys(validation, &validation_keys, "config.validation")?;
        let strict_schema_validation = schema::require_bool(
            &validation["strict_schema_validation"],
            "config.validation.strict_schema_validation",
        )?;
        let json_subset_only = schema::require_bool(
            &validation["json_subset_only"],
            "config.validation.json_subset_only",
        )?;
        if !json_subset_only {
            return Err(StateError::Validation(
                "config.validation.json_subset_only must be true.".to_string(),
            ));
        }

        let logging = require_section(map, "logging")?;
        schema::require_keys(logging, &["level", "log_file"], "config.logging")?;
        schema::reject_extra_keys(logging, &["level", "log_file"], "config.logging")?;
        let level_text = schema::require_string(&logging["level"], "config.logging.level")?;
        let log_file = schema::require_string(&logging["log_file"], "config.logging.log_file")?;
        schema::require_non_empty(level_text, "config.logging.level")?;
        schema::require_non_empty(log_file, "config.logging.log_file")?;
        let log_level = LogLevel::parse(level_text)?;

        Ok(Config {
            agent_command: agent_command.to_string(),
            startup_timeout_seconds,
            task_timeout_seconds,
            max_retries_per_task: max_retries_per_task as u32,
            max_consecutive_failures: max_consecutive_failures as u32,
            one_task_at_a_time,
            design_dir: design_dir.to_string(),
            state_dir: state_dir.to_string(),
            strict_schema_validation,
            json_subset_only,
            log_level,
            log_file: log_file.to_string(),
        })
    }
}

fn require_section<'a>(
    config: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Map<String, Value>, StateError> {
    config
        .get(name)
        .and_then(Value::as_object)
        .ok_or_else(|| StateError::Validation(format!("config.{name} must be an object.")))
}
