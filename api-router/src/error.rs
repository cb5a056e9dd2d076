use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Internal server error")]
    InternalError(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Forbidden(msg) => Self::Forbidden(msg),
            AppError::Conflict(msg) => Self::Conflict(msg),
            AppError::ServiceUnavailable(msg) => Self::ServiceUnavailable(msg),
            AppError::Unauthorized(msg) => Self::Unauthorized(msg),
            AppError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            AppError::PayloadTooLarge(msg) => Self::PayloadTooLarge(msg),
            other => {
                tracing::error!(error = %other, "internal error surfaced to the transport layer");
                Self::InternalError("internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retry_after_secs) = match &self {
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message.clone(), None),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.clone(), None),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message.clone(), None),
            Self::Conflict(message) => (StatusCode::CONFLICT, message.clone(), None),
            Self::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, message.clone(), None)
            }
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.clone(), None),
            Self::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limited".to_string(),
                Some(*retry_after_secs),
            ),
            Self::PayloadTooLarge(message) => {
                (StatusCode::PAYLOAD_TOO_LARGE, message.clone(), None)
            }
            Self::InternalError(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone(), None)
            }
        };

        let body = ErrorResponse {
            code: self.code(),
            error: message,
            retry_after_secs,
        };

        (status, Json(body)).into_response()
    }
}

impl ApiError {
    /// Stable machine-readable code, matching `AppError::code()` (§7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            Self::InternalError(_) => "INTERNAL",
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    code: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404_with_not_found_code() {
        let api_error: ApiError = AppError::NotFound("workspace not found".into()).into();
        assert_eq!(api_error.code(), "NOT_FOUND");
        let response = api_error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn database_errors_never_leak_internals() {
        let api_error: ApiError = AppError::Internal("pool exhausted, password=hunter2".into()).into();
        assert!(matches!(api_error, ApiError::InternalError(ref msg) if msg == "internal server error"));
    }

    #[test]
    fn rate_limited_carries_retry_after_hint() {
        let api_error: ApiError = AppError::RateLimited { retry_after_secs: 30 }.into();
        let response = api_error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn forbidden_and_conflict_map_to_their_status_codes() {
        let forbidden: ApiError = AppError::Forbidden("actor cannot write".into()).into();
        assert_eq!(forbidden.into_response().status(), StatusCode::FORBIDDEN);

        let conflict: ApiError = AppError::Conflict("already processing".into()).into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
    }
}
