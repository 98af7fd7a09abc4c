//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::FleetError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Unknown resource id
    NotFound(String),

    /// Operation not valid in the resource's current state
    Conflict(String),

    /// Invalid request parameters
    InvalidRequest(String),

    /// Command or notification could not be queued
    Unavailable(String),

    /// An agent reported a failed execution
    BadGateway(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        let message = err.to_string();
        match err {
            FleetError::NotFound { .. } => ApiError::NotFound(message),
            FleetError::InvalidState(_) => ApiError::Conflict(message),
            FleetError::InvalidInput(_) => ApiError::InvalidRequest(message),
            FleetError::TransportFailure(_) => ApiError::Unavailable(message),
            FleetError::ExecutionFailure(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
