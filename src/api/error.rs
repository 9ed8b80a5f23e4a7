//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::OnboardingError;

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
    #[error(transparent)]
    Onboarding(#[from] OnboardingError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Onboarding(e) => {
                let status = match e {
                    OnboardingError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                    OnboardingError::UnsupportedFileType(_) => {
                        StatusCode::UNSUPPORTED_MEDIA_TYPE
                    }
                    OnboardingError::Validation(_) => StatusCode::BAD_REQUEST,
                    OnboardingError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    OnboardingError::ConnectionFailed(_)
                    | OnboardingError::StreamInterrupted(_)
                    | OnboardingError::ExtractionServiceError(_) => StatusCode::BAD_GATEWAY,
                    OnboardingError::UploadFailed(_) | OnboardingError::LockPoisoned => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, error_code(e), e.to_string())
            }
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal error".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

fn error_code(e: &OnboardingError) -> &'static str {
    match e {
        OnboardingError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
        OnboardingError::SessionNotFound(_) => "SESSION_NOT_FOUND",
        OnboardingError::UploadFailed(_) => "UPLOAD_FAILED",
        OnboardingError::ConnectionFailed(_) => "UPSTREAM_UNAVAILABLE",
        OnboardingError::Timeout(_) => "TIMEOUT",
        OnboardingError::StreamInterrupted(_) => "STREAM_INTERRUPTED",
        OnboardingError::ExtractionServiceError(_) => "EXTRACTION_FAILED",
        OnboardingError::Validation(_) => "VALIDATION_ERROR",
        OnboardingError::LockPoisoned => "INTERNAL",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_maps_to_404() {
        let response =
            ApiError::from(OnboardingError::SessionNotFound("abc".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let response =
            ApiError::from(OnboardingError::Validation("bad".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unsupported_type_maps_to_415() {
        let response =
            ApiError::from(OnboardingError::UnsupportedFileType("x.txt".to_string()))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn timeout_maps_to_504() {
        let response = ApiError::from(OnboardingError::Timeout(60)).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
