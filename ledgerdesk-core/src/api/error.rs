use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::SubmitError;
use crate::form::schema::ValidationErrors;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failed; the reason is safe to show to the user.
    #[error("{0}")]
    Persist(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Invalid(errors) => ApiError::Invalid(errors),
            SubmitError::InFlight | SubmitError::AlreadySubmitted => ApiError::Conflict(err.to_string()),
            SubmitError::Persist(e) => ApiError::Persist(e.reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Persist(reason) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": reason }))).into_response()
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
