use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vaultkeep_core::{Schedule, Settings};
use vaultkeep_scheduler::{Executor, SchedulerError};

use crate::args::Operation;
use crate::error::{ResticError, Result};
use crate::truncate;

/// Runs schedules by invoking the restic binary.
pub struct ResticExecutor {
    binary: PathBuf,
    settings: Arc<Settings>,
}

impl ResticExecutor {
    pub fn new(binary: impl Into<PathBuf>, settings: Arc<Settings>) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    /// Look up everything `schedule` references. Blank ids mean "not set";
    /// ids that are set but unknown are errors.
    pub fn resolve(&self, schedule: &Schedule) -> Result<Operation> {
        let backup = match schedule.backup_id.trim() {
            "" => None,
            id => Some(self.settings.backup(id)?),
        };
        let source = match schedule.from_repository_id.trim() {
            "" => None,
            id => Some(self.settings.repository(id)?),
        };
        let target = match schedule.to_repository_id.trim() {
            "" => None,
            id => Some(self.settings.repository(id)?),
        };
        Operation::resolve(&schedule.id, backup, source, target)
    }

    /// Spawn restic for `op` and collect its stdout.
    ///
    /// The child is killed if the returned future is dropped before it exits.
    pub async fn run(&self, op: &Operation) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .args(op.args())
            .envs(op.envs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| ResticError::Spawn {
            binary: self.binary.display().to_string(),
            source,
        })?;
        debug!(pid = ?child.id(), operation = op.name(), "restic started");

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = truncate::tail(
            &String::from_utf8_lossy(&output.stderr),
            truncate::DEFAULT_MAX_CHARS,
        );
        Err(ResticError::NonZeroExit {
            code: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

#[async_trait]
impl Executor for ResticExecutor {
    async fn execute(
        &self,
        schedule: &Schedule,
        cancel: CancellationToken,
    ) -> vaultkeep_scheduler::Result<String> {
        // Pick up edits made to the settings file since the last rebuild.
        if let Err(e) = self.settings.refresh() {
            error!(job_id = %schedule.id, "settings refresh failed: {e}");
        }

        let op = self.resolve(schedule)?;
        info!(
            job_id = %schedule.id,
            operation = op.name(),
            repository = %op.target().path,
            "running restic"
        );

        tokio::select! {
            result = self.run(&op) => result.map_err(|e| {
                error!(job_id = %schedule.id, "restic failed: {e}");
                SchedulerError::from(e)
            }),
            _ = cancel.cancelled() => {
                info!(job_id = %schedule.id, "restic run cancelled");
                Err(SchedulerError::Cancelled)
            }
        }
    }
}
