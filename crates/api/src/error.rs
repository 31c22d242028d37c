use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use diag_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses,
/// except for [`CoreError::NotReadyYet`] which renders as an empty
/// `204 No Content` re-poll signal.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `diag_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Core(CoreError::NotReadyYet)) {
            return StatusCode::NO_CONTENT.into_response();
        }

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::ResourceNotFound(what) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{what} not found"),
                ),
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::BadRequest(msg) | CoreError::InvalidLevel(msg) => {
                    (StatusCode::BAD_REQUEST, "BAD_REQUEST", core_message(core, msg))
                }
                CoreError::UnknownCategory(_) => (
                    StatusCode::BAD_REQUEST,
                    "UNKNOWN_CATEGORY",
                    core.to_string(),
                ),
                CoreError::OperationFailed(msg) => {
                    tracing::warn!(error = %msg, "Diagnostic operation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "OPERATION_FAILED",
                        msg.clone(),
                    )
                }
                CoreError::NotReadyYet | CoreError::PortInUse { .. } => {
                    tracing::error!(error = %core, "Unexpected core error in handler");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// `InvalidLevel` only carries the offending value; render the full message.
fn core_message(core: &CoreError, msg: &str) -> String {
    match core {
        CoreError::InvalidLevel(_) => core.to_string(),
        _ => msg.to_string(),
    }
}
