use std::str::FromStr;

use chrono::{DateTime, Utc};
use vaultkeep_core::Schedule;

use crate::error::{Result, SchedulerError};

/// What drives a job's timer.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fires on every match of the cron expression.
    Cron {
        expression: String,
        schedule: cron::Schedule,
    },
    /// Never fires on its own; runs only when triggered manually.
    Manual,
}

impl Trigger {
    /// Build the trigger for `schedule`. An empty cron expression means manual-only.
    pub fn parse(schedule: &Schedule) -> Result<Self> {
        if schedule.is_manual_only() {
            return Ok(Trigger::Manual);
        }

        let expression = normalize_cron(&schedule.cron);
        let parsed =
            cron::Schedule::from_str(&expression).map_err(|e| SchedulerError::InvalidCron {
                id: schedule.id.clone(),
                expression: schedule.cron.clone(),
                reason: e.to_string(),
            })?;

        Ok(Trigger::Cron {
            expression,
            schedule: parsed,
        })
    }

    /// Compute the next UTC fire time strictly *after* `from`.
    ///
    /// Returns `None` for manual-only triggers and for cron expressions with no
    /// future match (e.g. a year field in the past).
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron { schedule, .. } => schedule.after(&from).next(),
            Trigger::Manual => None,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Trigger::Manual)
    }
}

/// Accept the classic 5-field form (`min hour dom mon dow`) by prepending a
/// zero seconds field. 6- and 7-field expressions pass through.
pub fn normalize_cron(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}
