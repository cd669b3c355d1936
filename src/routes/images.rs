use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Serves stored uploads under `/<prefix>/...`, the same form the asset store
/// hands out as image URLs.
pub fn router(prefix: &str) -> Router<AppState> {
    let prefix = prefix.trim_matches('/');
    Router::new().route(&format!("/{prefix}/{{*path}}"), get(serve))
}

async fn serve(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let prefix = &state.config.storage.public_prefix;
    let Some(file) = state.assets.resolve(&format!("{prefix}/{path}")) else {
        return not_found();
    };

    match tokio::fs::read(&file).await {
        Ok(data) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.as_ref().to_string()),
                    (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
                ],
                data,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => {
            tracing::error!("Failed to read image {}: {}", file.display(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Internal server error" })),
            )
                .into_response()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Image not found." })),
    )
        .into_response()
}
