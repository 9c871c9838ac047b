//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::bus::BusError;
use crate::repository::StoreError;
use crate::service::pipeline::PipelineError;
use crate::service::project::ProjectError;
use crate::service::trigger::TriggerError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The runner could not be reached or refused the hand-off.
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Runner hand-off failed: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::Store(err) => err.into(),
        }
    }
}

impl From<ProjectError> for ApiError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ProjectError::Validation(msg) => ApiError::BadRequest(msg),
            ProjectError::Store(err) => err.into(),
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::ProjectNotFound(_) => ApiError::NotFound(err.to_string()),
            TriggerError::RunnerNotConfigured
            | TriggerError::Handoff(_)
            | TriggerError::Rejected { .. } => ApiError::BadGateway(err.to_string()),
            TriggerError::Store(err) => err.into(),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
