//! Deployment status lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::errors::AppError;
use crate::AppState;

/// GET /api/status/{id} - Last recorded deployment for a task.
pub async fn get_status(State(state): State<AppState>, Path(task): Path<String>) -> Response {
    match state.store.get(&task).await {
        Ok(Some(record)) => Json(json!({
            "status": "found",
            "task": task,
            "record": record,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found", "task": task })),
        )
            .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}
