//! Error types for the vaultkeep-restic crate.

use thiserror::Error;
use vaultkeep_core::CoreError;
use vaultkeep_scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum ResticError {
    /// A referenced backup or repository is missing from the settings.
    #[error(transparent)]
    Settings(#[from] CoreError),

    /// The schedule does not describe exactly one backup or copy operation.
    #[error("Invalid operation for schedule {id}: {reason}")]
    InvalidOperation { id: String, reason: String },

    /// The restic binary could not be started.
    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// restic ran and reported failure.
    #[error("restic exited with {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

pub type Result<T> = std::result::Result<T, ResticError>;

impl From<ResticError> for SchedulerError {
    fn from(e: ResticError) -> Self {
        SchedulerError::Execution(e.to_string())
    }
}
