//! REST API module.
//!
//! Handlers for the deploy, validate, status and health endpoints.

mod deploy;
mod health;
mod status;
mod validate;

pub use deploy::*;
pub use health::*;
pub use status::*;
pub use validate::*;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::{StatusCode, Uri},
};

use crate::errors::AppError;

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// JSON body extractor whose rejections use the service's error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidJson(rejection.body_text())
        }
    }
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
