//! Error types for farewatch-engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<farewatch_common::Error> for ApiError {
    fn from(err: farewatch_common::Error) -> Self {
        match err {
            farewatch_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            farewatch_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_error_mapping() {
        let api: ApiError = farewatch_common::Error::NotFound("profile x".to_string()).into();
        assert!(matches!(api, ApiError::NotFound(_)));

        let api: ApiError = farewatch_common::Error::InvalidInput("bad page".to_string()).into();
        assert!(matches!(api, ApiError::BadRequest(_)));

        let api: ApiError = farewatch_common::Error::Internal("boom".to_string()).into();
        assert!(matches!(api, ApiError::Internal(_)));
    }
}
