use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use vaultkeep_protocol::actions::{ACTION_RUN, ACTION_STOP};

use super::{api_error, ApiResult};
use crate::app::AppState;

/// GET /api/schedules/{id}/{action}: fire-and-forget run or stop.
///
/// Unknown ids are accepted and ignored.
pub async fn schedule_action(
    State(state): State<Arc<AppState>>,
    Path((id, action)): Path<(String, String)>,
) -> ApiResult<String> {
    match action.as_str() {
        ACTION_RUN => state.engine.run_job_by_id(&id),
        ACTION_STOP => state.engine.stop_job_by_id(&id),
        other => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "UNKNOWN_ACTION",
                format!("unknown schedule action: {other}"),
            ))
        }
    }
    info!(job_id = %id, action = %action, "schedule action requested");
    Ok(format!("{action} schedule in the background"))
}
