//! Deploy endpoint.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::{validate_response, ApiJson};
use crate::errors::AppError;
use crate::models::RawDeploymentRequest;
use crate::pipeline::DeployError;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DeployParams {
    #[serde(default)]
    pub validate_only: Option<String>,
}

impl DeployParams {
    fn validate_only(&self) -> bool {
        matches!(
            self.validate_only.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("true" | "1" | "yes")
        )
    }
}

/// POST /api/deploy - Run the full pipeline for one request.
///
/// With `?validate_only=true` the request is only validated.
pub async fn deploy(
    State(state): State<AppState>,
    Query(params): Query<DeployParams>,
    ApiJson(raw): ApiJson<RawDeploymentRequest>,
) -> Response {
    if params.validate_only() {
        return validate_response(&state, raw);
    }

    match state.pipeline.deploy(raw).await {
        Ok(report) => Json(report).into_response(),
        Err(DeployError::Invalid(e)) => AppError::from(e).into_response(),
        Err(DeployError::Failed { error, report }) => {
            (error.status_code(), Json(report)).into_response()
        }
    }
}
