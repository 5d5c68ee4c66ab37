use axum::{extract::Query, Json};
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub path: String,
}

/// GET /api/path/autocomplete?path=: sub-directory names under `path`.
///
/// Read failures are logged and answered with an empty list.
pub async fn autocomplete(Query(query): Query<AutocompleteQuery>) -> Json<Vec<String>> {
    match list_dirs(&query.path).await {
        Ok(dirs) => Json(dirs),
        Err(e) => {
            error!(path = %query.path, "reading path: {e}");
            Json(Vec::new())
        }
    }
}

async fn list_dirs(path: &str) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    dirs.sort();
    Ok(dirs)
}
