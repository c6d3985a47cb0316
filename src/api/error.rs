//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::charting::ChartingError;
use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::intake::IntakeError;
use crate::pipeline::llm::LlmError;
use crate::reports::ReportError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::Unavailable(detail) => {
                tracing::warn!(detail, "Generation backend unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "BACKEND_UNAVAILABLE",
                    "The text generation service is temporarily unavailable".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            CoreError::Llm(e) => e.into(),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::InvalidRun(_) | IntakeError::EmptyInput => {
                ApiError::BadRequest(err.to_string())
            }
            IntakeError::DuplicateRun(_) => ApiError::Conflict(err.to_string()),
            IntakeError::PatientNotFound(_) => ApiError::NotFound(err.to_string()),
            IntakeError::MalformedDraft(_) => ApiError::Unavailable(err.to_string()),
            IntakeError::Database(e) => e.into(),
            IntakeError::Llm(e) => e.into(),
        }
    }
}

impl From<ChartingError> for ApiError {
    fn from(err: ChartingError) -> Self {
        match err {
            ChartingError::PatientNotFound(_) | ChartingError::CaseNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            ChartingError::EmptyInput => ApiError::BadRequest(err.to_string()),
            ChartingError::EmptyGeneration => ApiError::Unavailable(err.to_string()),
            ChartingError::Database(e) => e.into(),
            ChartingError::Llm(e) => e.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::CaseNotFound(_) => ApiError::NotFound(err.to_string()),
            ReportError::EmptyReport => ApiError::Unavailable(err.to_string()),
            ReportError::Database(e) => e.into(),
            ReportError::Llm(e) => e.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {err}"))
    }
}
