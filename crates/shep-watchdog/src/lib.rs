//! # shep-watchdog
//!
//! Retry and failure accounting for the Shepherd control loop.
//!
//! Two counters, both in memory only: a per-task attempt count (how many
//! times a task has failed this run) and a global consecutive-failure
//! count (how many agent invocations in a row have failed, across tasks).
//! Any success resets the consecutive counter; the control loop halts the
//! run once the consecutive counter reaches its ceiling.

use std::collections::HashMap;

use tracing::debug;

/// In-memory retry accounting for one shepherd run.
#[derive(Debug)]
pub struct RetryTracker {
    max_retries_per_task: u32,
    max_consecutive_failures: u32,
    attempts: HashMap<String, u32>,
    consecutive_failures: u32,
}

impl RetryTracker {
    pub fn new(max_retries_per_task: u32, max_consecutive_failures: u32) -> Self {
        RetryTracker {
            max_retries_per_task,
            max_consecutive_failures,
            attempts: HashMap::new(),
            consecutive_failures: 0,
        }
    }

    /// A task succeeded: zero the consecutive counter and forget the
    /// task's attempt history.
    pub fn record_success(&mut self, task_id: &str) {
        self.consecutive_failures = 0;
        self.attempts.remove(task_id);
    }

    /// A task failed: bump both the task's attempt count and the global
    /// consecutive counter.
    pub fn record_failure(&mut self, task_id: &str) {
        self.consecutive_failures += 1;
        let attempts = self.attempts.entry(task_id.to_string()).or_insert(0);
        *attempts += 1;
        debug!(
            task_id,
            attempts = *attempts,
            consecutive = self.consecutive_failures,
            "failure recorded"
        );
    }

    /// True while the task's failed attempts are within the retry budget.
    pub fn can_retry(&self, task_id: &str) -> bool {
        self.attempts.get(task_id).copied().unwrap_or(0) <= self.max_retries_per_task
    }

    /// True once the global consecutive-failure ceiling is reached.
    pub fn too_many_consecutive_failures(&self) -> bool {
        self.consecutive_failures >= self.max_consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
