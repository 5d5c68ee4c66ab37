use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vaultkeep_core::Schedule;

/// Read-only snapshot of a job's runtime record.
///
/// Returned by value from the registry; mutating it has no effect on the
/// scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Same as the owning schedule's id.
    pub id: String,
    pub schedule: Schedule,
    /// True between a run's start and its completion.
    pub running: bool,
    /// True while the current run is one that was triggered manually.
    pub forced: bool,
    /// Error text of the most recent run; `None` after a success or before any run.
    pub last_error: Option<String>,
    /// Next timer fire, `None` for manual-only schedules.
    pub next_run: Option<DateTime<Utc>>,
}
