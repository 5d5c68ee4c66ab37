use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::info;
use vaultkeep_core::AppConfig;

use super::{core_error, ApiResult};
use crate::app::AppState;

/// GET /api/config: current settings document, re-read from disk.
pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<Json<AppConfig>> {
    state.settings.refresh().map_err(core_error)?;
    Ok(Json(state.settings.config()))
}

/// POST /api/config: persist the settings document and reschedule.
pub async fn save_config(
    State(state): State<Arc<AppState>>,
    Json(config): Json<AppConfig>,
) -> ApiResult<Json<AppConfig>> {
    state.settings.save(config).map_err(core_error)?;

    let saved = state.settings.config();
    let installed = state.engine.rebuild_schedule(&saved.schedules);
    info!(installed, "configuration saved");
    Ok(Json(saved))
}
