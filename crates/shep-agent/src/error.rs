// error.rs — Agent execution errors.

use thiserror::Error;

/// Errors from running a task through the agent subprocess.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The process failed to start, or died before sending output.
    #[error("agent process error: {0}")]
    Process(String),

    /// The response was empty, non-JSON, or not a JSON object.
    #[error("agent protocol error: {0}")]
    Protocol(String),

    /// No response line arrived within the task timeout.
    #[error("{0}")]
    Timeout(String),
}
