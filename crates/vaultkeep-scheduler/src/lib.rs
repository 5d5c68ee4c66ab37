//! `vaultkeep-scheduler` — Tokio-based scheduling engine for backup jobs.
//!
//! # Overview
//!
//! A rebuild turns the configured [`Schedule`](vaultkeep_core::Schedule)s into
//! one [`registry::JobRegistry`] record and one timer loop each. When a timer
//! fires (or a run is requested manually) the engine flips the record to
//! running, calls the [`executor::Executor`], and flips it back, reporting
//! every transition through the [`emitter::StatusEmitter`] queues.
//!
//! # Schedule variants
//!
//! | Cron field    | Behaviour                                          |
//! |---------------|----------------------------------------------------|
//! | 5-field       | Classic `min hour dom mon dow`, seconds fixed at 0 |
//! | 6/7-field     | Seconds-first, optional year                       |
//! | empty         | Manual trigger only                                |

pub mod emitter;
pub mod engine;
pub mod error;
pub mod executor;
pub mod registry;
pub mod schedule;
pub mod types;

pub use emitter::{status_channel, StatusEmitter, StatusReceivers};
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use executor::{Executor, LastRunSink};
pub use registry::JobRegistry;
pub use types::Job;
