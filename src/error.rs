//! Error types for the bridge.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::platform::PlatformError;
use crate::services::mirror::MirrorError;

/// Failures inside an event handler.
///
/// Handlers propagate these with `?`; the router turns them into
/// [`ActionResult::Error`](crate::models::ActionResult::Error).
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A remote platform call failed
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Mirroring a branch through git failed
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// The platform refused to merge
    #[error("{repo}: PR#{number} failed to merge - \"{message}\"")]
    MergeRejected {
        repo: String,
        number: u64,
        message: String,
    },

    /// The target platform refused the mirrored ref
    #[error("{repo}: push of {git_ref} rejected - \"{message}\"")]
    PushRejected {
        repo: String,
        git_ref: String,
        message: String,
    },
}

/// Convenience type alias for handler results.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// HTTP-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_code) = match self {
            AppError::InvalidInput(_) => (actix_web::http::StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::Unauthorized(_) => {
                (actix_web::http::StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: self.to_string(),
        })
    }
}

/// Error response body.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}
