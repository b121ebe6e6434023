//! Validation-only endpoint.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::ApiJson;
use crate::errors::AppError;
use crate::models::RawDeploymentRequest;
use crate::AppState;

/// Summary of a request that passed validation.
#[derive(Debug, Serialize)]
pub struct ValidatedData {
    pub task: String,
    pub round: u32,
    pub email: Option<String>,
    pub brief_length: usize,
    pub checks_count: usize,
    pub attachments_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub validated_data: ValidatedData,
}

/// POST /api/validate - Validate a deploy request without running it.
pub async fn validate_request(
    State(state): State<AppState>,
    ApiJson(raw): ApiJson<RawDeploymentRequest>,
) -> Response {
    validate_response(&state, raw)
}

pub(super) fn validate_response(state: &AppState, raw: RawDeploymentRequest) -> Response {
    match state.pipeline.validate(raw) {
        Ok(request) => Json(ValidateResponse {
            status: "success",
            message: "Request is valid",
            validated_data: ValidatedData {
                brief_length: request.brief.chars().count(),
                checks_count: request.checks.len(),
                attachments_count: request.attachments.len(),
                task: request.task,
                round: request.round,
                email: request.email,
            },
        })
        .into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}
