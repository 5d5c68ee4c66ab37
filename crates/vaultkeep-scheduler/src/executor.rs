use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use vaultkeep_core::{Schedule, Settings};

use crate::error::Result;

/// Runs the backup/copy operation a schedule points at.
///
/// `cancel` fires on a manual stop; honouring it is optional. The engine stops
/// waiting on the returned future either way.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, schedule: &Schedule, cancel: CancellationToken) -> Result<String>;
}

/// Receives the outcome of every finished run. An empty `error` means success.
pub trait LastRunSink: Send + Sync {
    fn record(&self, schedule_id: &str, error: &str);
}

impl LastRunSink for Settings {
    fn record(&self, schedule_id: &str, error: &str) {
        if let Err(e) = self.set_last_run(schedule_id, error) {
            warn!(job_id = %schedule_id, "failed to persist last run: {e}");
        }
    }
}
