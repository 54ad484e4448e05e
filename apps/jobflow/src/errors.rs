use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::host::HostError;
use crate::workflow::WorkflowError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Host table error: {0}")]
    Host(#[from] HostError),
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(_) | WorkflowError::Resume { .. } => {
                AppError::Validation(err.to_string())
            }
            WorkflowError::AlreadyRunning(_) | WorkflowError::NotActive(_) => {
                AppError::Conflict(err.to_string())
            }
            WorkflowError::NotFound(_) => AppError::NotFound(err.to_string()),
            WorkflowError::Host(HostError::RecordNotFound(id)) => {
                AppError::NotFound(format!("Job opening {id} not found"))
            }
            WorkflowError::Host(e) => AppError::Host(e),
            WorkflowError::Health(_)
            | WorkflowError::Submit(_)
            | WorkflowError::Poll(_)
            | WorkflowError::Results(_) => AppError::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone())
            }
            AppError::Host(e) => {
                tracing::error!("Host table error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "HOST_ERROR",
                    "The host table could not be read".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
