//! vaultkeep-restic — runs scheduled backups and copies through the restic CLI.
//!
//! A schedule names either a backup (local path) or a source repository, plus
//! a target repository:
//!
//! | Set on schedule      | Invocation                                              |
//! |----------------------|---------------------------------------------------------|
//! | backup + target      | `restic -r <target> --json backup <path> <params…>`     |
//! | source + target      | `restic -r <target> --json copy --from-repo <source>`   |
//!
//! Anything else is rejected before a process is spawned.

pub mod args;
pub mod error;
pub mod executor;
pub mod truncate;

pub use args::Operation;
pub use error::{ResticError, Result};
pub use executor::ResticExecutor;
