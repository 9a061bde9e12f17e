use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Error taxonomy shared by every core component.
///
/// Validation failures are raised before any side effect. "Not yours" and
/// "doesn't exist" are deliberately merged into `NotFound` so responses do
/// not leak the existence of other owners' data.
#[derive(Debug, Error)]
pub enum DriveError {
    /// Malformed input, caught before any write.
    #[error("{0}")]
    InvalidArgument(String),

    /// Referenced entity absent, or not owned by the caller.
    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness violation, surfaced by the store as the final arbiter.
    #[error("{0}")]
    Conflict(String),

    /// MIME type or extension blocked by the upload allow-list.
    #[error("file type `{0}` is not allowed")]
    UnsupportedMediaType(String),

    #[error("payload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: i64, limit: i64 },

    /// The remote blob backend is unreachable or answered with a server
    /// error. Distinct from `NotFound` so clients can retry.
    #[error("blob backend unavailable: {0}")]
    ServiceUnavailable(String),

    /// Identity headers missing or garbled.
    #[error("missing or invalid identity")]
    Unauthenticated,

    /// Caller authenticated but lacks the required role.
    #[error("admin role required")]
    Unauthorized,

    /// Unexpected persistence or relay failure, including data-integrity
    /// breaches such as a parent walk exceeding the depth cap.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DriveResult<T> = Result<T, DriveError>;

impl DriveError {
    /// Machine-readable kind string included in every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            DriveError::InvalidArgument(_) => "invalid_argument",
            DriveError::NotFound(_) => "not_found",
            DriveError::Conflict(_) => "conflict",
            DriveError::UnsupportedMediaType(_) => "unsupported_media_type",
            DriveError::PayloadTooLarge { .. } => "payload_too_large",
            DriveError::ServiceUnavailable(_) => "service_unavailable",
            DriveError::Unauthenticated => "unauthenticated",
            DriveError::Unauthorized => "unauthorized",
            DriveError::Internal(_) | DriveError::Sqlx(_) | DriveError::Io(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            DriveError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            DriveError::NotFound(_) => StatusCode::NOT_FOUND,
            DriveError::Conflict(_) => StatusCode::CONFLICT,
            DriveError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DriveError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DriveError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DriveError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DriveError::Unauthorized => StatusCode::FORBIDDEN,
            DriveError::Internal(_) | DriveError::Sqlx(_) | DriveError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Return true if a SQLx error indicates a unique constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// A lightweight wrapper carrying an HTTP status alongside the message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind: "error",
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: msg.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<DriveError> for AppError {
    fn from(err: DriveError) -> Self {
        let status = err.status();
        let kind = err.kind();
        // Internal details stay in the log, not the response body.
        let message = match &err {
            DriveError::Sqlx(_) | DriveError::Io(_) | DriveError::Internal(_) => {
                tracing::error!(error = %err, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            status,
            kind,
            message,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(
            DriveError::NotFound("folder".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DriveError::Conflict("name taken".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            DriveError::PayloadTooLarge { size: 1, limit: 0 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(DriveError::Unauthorized.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_details_are_not_echoed() {
        let app: AppError = DriveError::Internal("pool exhausted".into()).into();
        assert_eq!(app.message, "internal error");
        assert_eq!(app.kind, "internal");
    }

    #[test]
    fn not_found_message_names_the_entity() {
        let err = DriveError::NotFound("folder".into());
        assert_eq!(err.to_string(), "folder not found");
    }
}
