pub mod autocomplete;
pub mod config;
pub mod health;
pub mod jobs;
pub mod schedules;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use vaultkeep_core::CoreError;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub error: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn api_error(
    status: StatusCode,
    code: &'static str,
    error: impl Into<String>,
) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            code,
            error: error.into(),
        }),
    )
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self {
            code: e.code(),
            error: e.to_string(),
        }
    }
}

pub fn core_error(e: CoreError) -> (StatusCode, Json<ApiError>) {
    let status = match e {
        CoreError::RepositoryNotFound { .. }
        | CoreError::BackupNotFound { .. }
        | CoreError::ScheduleNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Serialization(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError::from(e)))
}
