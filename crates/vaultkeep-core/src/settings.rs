//! Persisted user settings: a single JSON document on disk, mirrored in memory.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::types::{AppConfig, Backup, LastRun, Repository};

/// Shared settings store. Pass around as `Arc<Settings>`.
pub struct Settings {
    /// `None` keeps everything in memory (tests, ephemeral runs).
    path: Option<PathBuf>,
    config: RwLock<AppConfig>,
}

impl Settings {
    /// Open the document at `path`. A missing file is an empty config, not an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = read_document(&path)?;
        info!(path = %path.display(), schedules = config.schedules.len(), "settings loaded");
        Ok(Self {
            path: Some(path),
            config: RwLock::new(config),
        })
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current document.
    pub fn config(&self) -> AppConfig {
        self.config.read().expect("settings poisoned").clone()
    }

    /// Re-read the document from disk, picking up external edits.
    pub fn refresh(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = read_document(path)?;
        *self.config.write().expect("settings poisoned") = fresh;
        debug!(path = %path.display(), "settings refreshed");
        Ok(())
    }

    /// Replace the document and write it to disk.
    ///
    /// Last-run outcomes are owned by the daemon, so entries the caller did not
    /// send are carried over from the current document.
    pub fn save(&self, mut config: AppConfig) -> Result<()> {
        let mut current = self.config.write().expect("settings poisoned");
        for (id, run) in &current.last_runs {
            config
                .last_runs
                .entry(id.clone())
                .or_insert_with(|| run.clone());
        }
        if let Some(path) = &self.path {
            write_document(path, &config)?;
        }
        *current = config;
        info!(schedules = current.schedules.len(), "settings saved");
        Ok(())
    }

    /// Record the outcome of a run. An empty `error` means success.
    pub fn set_last_run(&self, schedule_id: &str, error: &str) -> Result<()> {
        let mut current = self.config.write().expect("settings poisoned");
        current.last_runs.insert(
            schedule_id.to_string(),
            LastRun {
                at: Utc::now(),
                error: error.to_string(),
            },
        );
        if let Some(path) = &self.path {
            write_document(path, &current)?;
        }
        Ok(())
    }

    pub fn repository(&self, id: &str) -> Result<Repository> {
        self.config
            .read()
            .expect("settings poisoned")
            .repositories
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| CoreError::RepositoryNotFound { id: id.to_string() })
    }

    pub fn backup(&self, id: &str) -> Result<Backup> {
        self.config
            .read()
            .expect("settings poisoned")
            .backups
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| CoreError::BackupNotFound { id: id.to_string() })
    }
}

fn read_document(path: &Path) -> Result<AppConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(AppConfig::default()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "settings file not found, starting empty");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write via a sibling temp file + rename so readers never see a torn document.
fn write_document(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path).map_err(|e| CoreError::Settings(format!("rename failed: {e}")))?;
    Ok(())
}
