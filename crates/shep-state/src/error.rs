// error.rs — Error types for state access and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing persistent state.
#[derive(Debug, Error)]
pub enum StateError {
    /// A required file or directory is absent.
    #[error("missing required state: {0}")]
    Missing(String),

    /// A state file failed schema or type validation. The message carries
    /// a dotted context path such as `plan.tasks[3].depends_on[1]`.
    #[error("{0}")]
    Validation(String),

    /// An attempt was made to write a read-only path.
    #[error("{} is read-only", path.display())]
    ReadOnly { path: PathBuf },

    /// An attempt was made to write a path outside the writable set.
    #[error("refusing to write unknown state file: {}", path.display())]
    UnknownPath { path: PathBuf },

    /// A file I/O operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}
