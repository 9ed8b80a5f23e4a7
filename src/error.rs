//! Error taxonomy for the onboarding engine.
//!
//! One enum covers the whole orchestration surface so that per-unit error
//! descriptors, API responses, and stream `error` events all classify
//! failures the same way.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnboardingError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Could not open transport: {0}")]
    ConnectionFailed(String),

    #[error("No terminal signal within {0} seconds")]
    Timeout(u64),

    #[error("Transport closed mid-read: {0}")]
    StreamInterrupted(String),

    #[error("Extraction service reported failure: {0}")]
    ExtractionServiceError(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal lock error")]
    LockPoisoned,
}

impl OnboardingError {
    /// Stable classification label, used in per-unit error descriptors
    /// and stream `error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType(_) => "unsupported_file_type",
            Self::SessionNotFound(_) => "session_not_found",
            Self::UploadFailed(_) => "upload_failed",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::Timeout(_) => "timeout",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::ExtractionServiceError(_) => "extraction_service_error",
            Self::Validation(_) => "validation_error",
            Self::LockPoisoned => "internal",
        }
    }
}
