// error.rs — Policy violation errors.

use thiserror::Error;

/// A safety rule was violated by the agent's reported changes.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The agent reported changes under a protected directory or outside
    /// the project root. `paths` lists the offenders, sorted.
    #[error("forbidden files modified: {paths}")]
    ForbiddenChanges { paths: String },

    /// A `files_changed` entry was not a string.
    #[error("files_changed entries must be strings")]
    NonStringEntry,

    /// `files_changed` was present but not an array.
    #[error("files_changed must be an array")]
    NotAList,
}
