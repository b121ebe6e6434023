//! Error handling module for the deployment service.
//!
//! Each pipeline stage has its own error type; `AppError` wraps them and maps
//! every failure kind to an HTTP status code and a stable machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const MISSING_FIELD: &str = "MISSING_FIELD";
    pub const INVALID_SECRET: &str = "INVALID_SECRET";
    pub const INVALID_ROUND: &str = "INVALID_ROUND";
    pub const EMPTY_BRIEF: &str = "EMPTY_BRIEF";
    pub const INVALID_CHECK: &str = "INVALID_CHECK";
    pub const INVALID_EMAIL: &str = "INVALID_EMAIL";
    pub const INVALID_CALLBACK_URL: &str = "INVALID_CALLBACK_URL";
    pub const INVALID_JSON: &str = "INVALID_JSON";
    pub const REQUEST_TOO_LARGE: &str = "REQUEST_TOO_LARGE";
    pub const NO_PRIOR_DEPLOYMENT: &str = "NO_PRIOR_DEPLOYMENT";
    pub const GENERATION_ERROR: &str = "GENERATION_ERROR";
    pub const HOSTING_ERROR: &str = "HOSTING_ERROR";
    pub const STATE_ERROR: &str = "STATE_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// Rejections raised before any external call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid secret")]
    InvalidSecret,

    #[error("Round must be a positive integer, got {0}")]
    InvalidRound(String),

    #[error("Brief must not be empty")]
    EmptyBrief,

    #[error("Check at index {0} must be a string or an object with 'description' or 'js'")]
    InvalidCheck(usize),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("evaluation_url must be an absolute http(s) URL: {0}")]
    InvalidCallbackUrl(String),
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => codes::MISSING_FIELD,
            ValidationError::InvalidSecret => codes::INVALID_SECRET,
            ValidationError::InvalidRound(_) => codes::INVALID_ROUND,
            ValidationError::EmptyBrief => codes::EMPTY_BRIEF,
            ValidationError::InvalidCheck(_) => codes::INVALID_CHECK,
            ValidationError::InvalidEmail(_) => codes::INVALID_EMAIL,
            ValidationError::InvalidCallbackUrl(_) => codes::INVALID_CALLBACK_URL,
        }
    }
}

/// Failures of the completion API or of its output.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("LLM response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("Generated document rejected: {0}")]
    InvalidDocument(String),
}

/// Failures of the hosting API after retries are exhausted.
#[derive(Debug, Error)]
pub enum HostingError {
    #[error("Hosting request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Hosting API returned {status} for {operation}: {body}")]
    Upstream {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Repository name {0} is already taken")]
    NameTaken(String),

    #[error("Unexpected hosting response: {0}")]
    MalformedResponse(String),
}

/// Failures reading or writing the deployment state document.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No prior deployment found for task {0}; round 1 must succeed first")]
    NoPriorDeployment(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Hosting(#[from] HostingError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("Request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::InvalidSecret) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoPriorDeployment(_) => StatusCode::CONFLICT,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::Hosting(_) => StatusCode::BAD_GATEWAY,
            AppError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(e) => e.error_code(),
            AppError::NoPriorDeployment(_) => codes::NO_PRIOR_DEPLOYMENT,
            AppError::Generation(_) => codes::GENERATION_ERROR,
            AppError::Hosting(_) => codes::HOSTING_ERROR,
            AppError::State(_) => codes::STATE_ERROR,
            AppError::InvalidJson(_) => codes::INVALID_JSON,
            AppError::PayloadTooLarge => codes::REQUEST_TOO_LARGE,
            AppError::NotFound(_) => codes::NOT_FOUND,
        }
    }

    /// Pipeline stage the error belongs to, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::InvalidJson(_) | AppError::PayloadTooLarge => {
                "validate"
            }
            AppError::NoPriorDeployment(_) | AppError::State(_) => "state",
            AppError::Generation(_) => "generate",
            AppError::Hosting(_) => "publish",
            AppError::NotFound(_) => "request",
        }
    }
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(stage = self.stage(), "{}", self);
        }
        (status, Json(ErrorResponse::new(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_secret_is_unauthorized() {
        let err = AppError::from(ValidationError::InvalidSecret);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), codes::INVALID_SECRET);
    }

    #[test]
    fn test_validation_errors_have_distinct_codes() {
        let errors = [
            ValidationError::MissingField("task"),
            ValidationError::InvalidSecret,
            ValidationError::InvalidRound("0".into()),
            ValidationError::EmptyBrief,
            ValidationError::InvalidCheck(0),
            ValidationError::InvalidEmail("x".into()),
            ValidationError::InvalidCallbackUrl("x".into()),
        ];
        let mut seen: Vec<&str> = errors.iter().map(|e| e.error_code()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), errors.len());
    }

    #[test]
    fn test_stage_failures_map_to_gateway_or_server_errors() {
        let gen = AppError::from(GenerationError::InvalidDocument("empty".into()));
        assert_eq!(gen.status_code(), StatusCode::BAD_GATEWAY);

        let state = AppError::from(StateError::Io(std::io::Error::other("disk")));
        assert_eq!(state.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let prior = AppError::NoPriorDeployment("t".into());
        assert_eq!(prior.status_code(), StatusCode::CONFLICT);
        assert!(prior.to_string().contains("No prior deployment"));
    }

    #[test]
    fn test_app_errors_have_distinct_codes() {
        let errors = [
            AppError::NoPriorDeployment("t".into()),
            AppError::from(GenerationError::InvalidDocument("empty".into())),
            AppError::from(HostingError::MalformedResponse("x".into())),
            AppError::from(StateError::Io(std::io::Error::other("disk"))),
            AppError::InvalidJson("x".into()),
            AppError::PayloadTooLarge,
            AppError::NotFound("x".into()),
        ];
        let mut seen: Vec<&str> = errors.iter().map(AppError::error_code).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), errors.len());
        assert!(errors
            .iter()
            .all(|e| e.status_code().is_client_error() || e.status_code().is_server_error()));
    }
}
