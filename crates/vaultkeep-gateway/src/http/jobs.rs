use std::sync::Arc;

use axum::{extract::State, Json};
use vaultkeep_scheduler::Job;

use crate::app::AppState;

/// GET /api/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.engine.jobs())
}

/// GET /api/jobs/running: what the status indicator shows.
pub async fn running_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.engine.running_jobs())
}
