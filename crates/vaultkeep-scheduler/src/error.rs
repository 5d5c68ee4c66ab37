use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression of a schedule could not be parsed.
    #[error("Invalid cron expression '{expression}' for schedule {id}: {reason}")]
    InvalidCron {
        id: String,
        expression: String,
        reason: String,
    },

    /// Two schedules in one rebuild share an id.
    #[error("Duplicate schedule id: {id}")]
    DuplicateSchedule { id: String },

    /// The executor reported a failed run. Displays the executor's message verbatim.
    #[error("{0}")]
    Execution(String),

    /// The run was interrupted by a manual stop or a rebuild.
    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
