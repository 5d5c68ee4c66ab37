use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The user's settings document: everything edited from the UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub backups: Vec<Backup>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    /// Outcome of the most recent run per schedule id.
    #[serde(default)]
    pub last_runs: BTreeMap<String, LastRun>,
}

/// Storage backend of a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    Local,
    B2,
    S3,
    Gcs,
    Azure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: RepositoryKind,
    /// Repository location as understood by the backup tool (`-r`).
    pub path: String,
    #[serde(default)]
    pub password: String,
    /// Backend credentials exported to the child environment (e.g. `B2_ACCOUNT_ID`).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Directory to back up.
    pub path: String,
    /// Extra CLI argument groups, e.g. `[["--exclude", "*.tmp"], ["--one-file-system"]]`.
    #[serde(default)]
    pub backup_params: Vec<Vec<String>>,
}

/// A recurring (or manual-only) job definition.
///
/// Immutable for one scheduling generation: a rebuild replaces the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    /// Cron expression. Empty means "manual trigger only".
    #[serde(default)]
    pub cron: String,
    #[serde(default)]
    pub backup_id: String,
    #[serde(default)]
    pub to_repository_id: String,
    #[serde(default)]
    pub from_repository_id: String,
}

impl Schedule {
    pub fn is_manual_only(&self) -> bool {
        self.cron.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub at: DateTime<Utc>,
    /// Empty after a successful run.
    #[serde(default)]
    pub error: String,
}
