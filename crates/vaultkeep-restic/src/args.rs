//! Command-line and environment construction for restic invocations.
//!
//! Pure functions; nothing here touches the filesystem or spawns processes.

use vaultkeep_core::{Backup, Repository};

use crate::error::{ResticError, Result};

/// The single operation a schedule resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Snapshot a local path into `target`.
    Backup { backup: Backup, target: Repository },
    /// Copy snapshots from `source` into `target`.
    Copy { source: Repository, target: Repository },
}

impl Operation {
    /// Pick the operation for schedule `id`. Exactly one of `backup` and
    /// `source` must be set, and `target` is always required.
    pub fn resolve(
        id: &str,
        backup: Option<Backup>,
        source: Option<Repository>,
        target: Option<Repository>,
    ) -> Result<Self> {
        let invalid = |reason: &str| ResticError::InvalidOperation {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let target = target.ok_or_else(|| invalid("no target repository"))?;
        match (backup, source) {
            (Some(backup), None) => Ok(Operation::Backup { backup, target }),
            (None, Some(source)) => Ok(Operation::Copy { source, target }),
            (Some(_), Some(_)) => Err(invalid("both a backup and a source repository are set")),
            (None, None) => Err(invalid("neither a backup nor a source repository is set")),
        }
    }

    pub fn target(&self) -> &Repository {
        match self {
            Operation::Backup { target, .. } | Operation::Copy { target, .. } => target,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Backup { .. } => "backup",
            Operation::Copy { .. } => "copy",
        }
    }

    /// Full argument vector, starting with the global repository flags.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-r".to_string(),
            self.target().path.clone(),
            "--json".to_string(),
        ];
        match self {
            Operation::Backup { backup, .. } => {
                args.push("backup".to_string());
                args.push(backup.path.clone());
                args.extend(backup.backup_params.iter().flatten().cloned());
            }
            Operation::Copy { source, .. } => {
                args.push("copy".to_string());
                args.push("--from-repo".to_string());
                args.push(source.path.clone());
            }
        }
        args
    }

    /// Environment for the child: passwords plus each repository's backend
    /// options, upper-cased (`b2_account_id` ⇒ `B2_ACCOUNT_ID`).
    pub fn envs(&self) -> Vec<(String, String)> {
        let target = self.target();
        let mut envs = option_envs(target);
        if let Operation::Copy { source, .. } = self {
            envs.extend(option_envs(source));
            envs.push(("RESTIC_FROM_PASSWORD".to_string(), source.password.clone()));
        }
        envs.push(("RESTIC_PASSWORD".to_string(), target.password.clone()));
        envs
    }
}

fn option_envs(repository: &Repository) -> Vec<(String, String)> {
    repository
        .options
        .iter()
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_ascii_uppercase(), value.clone()))
        .collect()
}
