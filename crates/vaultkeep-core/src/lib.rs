//! `vaultkeep-core` — configuration, persisted settings and shared errors.
//!
//! Two kinds of configuration live here:
//!
//! - [`config::VaultkeepConfig`]: how the daemon itself runs (bind address,
//!   runner size, viewer liveness timings). TOML + `VAULTKEEP_*` env.
//! - [`settings::Settings`]: the user's repositories, backups and schedules.
//!   A JSON document edited from the UI and saved back through the gateway.

pub mod config;
pub mod error;
pub mod settings;
pub mod types;

pub use error::{CoreError, Result};
pub use settings::Settings;
pub use types::{AppConfig, Backup, LastRun, Repository, RepositoryKind, Schedule};
