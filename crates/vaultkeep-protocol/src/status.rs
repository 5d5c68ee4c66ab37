use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which of the two status queues a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusStream {
    /// Success path: running-flag transitions.
    Output,
    /// Error path: failure text of a finished run.
    Error,
}

/// One message on a status queue.
/// Wire: `{ "id": "s1", "msg": "{\"running\":true}", "time": "2026-01-01T00:00:00Z" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChanMsg {
    pub id: String,
    pub msg: String,
    pub time: DateTime<Utc>,
}

impl ChanMsg {
    pub fn new(id: impl Into<String>, msg: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            msg: msg.into(),
            time,
        }
    }
}

/// Body of every success-path message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningPayload {
    pub running: bool,
}

impl RunningPayload {
    /// JSON text carried in [`ChanMsg::msg`].
    pub fn encode(running: bool) -> String {
        serde_json::json!({ "running": running }).to_string()
    }
}

/// Job lifecycle transition reported by the scheduling engine.
/// Wire: `{ "type": "job_finished_error", "id": "s2", "error": "disk full", "at": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    JobStarted {
        id: String,
        at: DateTime<Utc>,
    },
    JobFinishedOk {
        id: String,
        at: DateTime<Utc>,
    },
    JobFinishedError {
        id: String,
        error: String,
        at: DateTime<Utc>,
    },
    /// A manual stop was requested; reported ahead of the run actually unwinding.
    JobStopRequested {
        id: String,
        at: DateTime<Utc>,
    },
}

impl StatusEvent {
    pub fn started(id: impl Into<String>) -> Self {
        StatusEvent::JobStarted {
            id: id.into(),
            at: Utc::now(),
        }
    }

    pub fn finished_ok(id: impl Into<String>) -> Self {
        StatusEvent::JobFinishedOk {
            id: id.into(),
            at: Utc::now(),
        }
    }

    pub fn finished_error(id: impl Into<String>, error: impl Into<String>) -> Self {
        StatusEvent::JobFinishedError {
            id: id.into(),
            error: error.into(),
            at: Utc::now(),
        }
    }

    pub fn stop_requested(id: impl Into<String>) -> Self {
        StatusEvent::JobStopRequested {
            id: id.into(),
            at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            StatusEvent::JobStarted { id, .. }
            | StatusEvent::JobFinishedOk { id, .. }
            | StatusEvent::JobFinishedError { id, .. }
            | StatusEvent::JobStopRequested { id, .. } => id,
        }
    }

    /// Whether the job is running once this event has been observed.
    pub fn running(&self) -> bool {
        matches!(self, StatusEvent::JobStarted { .. })
    }

    /// Lower onto the two queues: always one success-path message, plus an
    /// error-path message for failed runs.
    pub fn into_messages(self) -> (ChanMsg, Option<ChanMsg>) {
        let running = self.running();
        match self {
            StatusEvent::JobFinishedError { id, error, at } => (
                ChanMsg::new(id.clone(), RunningPayload::encode(running), at),
                Some(ChanMsg::new(id, error, at)),
            ),
            StatusEvent::JobStarted { id, at }
            | StatusEvent::JobFinishedOk { id, at }
            | StatusEvent::JobStopRequested { id, at } => {
                (ChanMsg::new(id, RunningPayload::encode(running), at), None)
            }
        }
    }
}
