//! Error types for msm-web

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
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

    /// Missing or unknown caller (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the required role (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Write rejected but recoverable (409)
    ///
    /// `form` carries the submitted form state so the client can redisplay it.
    #[error("Conflict: {message}")]
    Conflict { message: String, form: Option<Value> },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            form: None,
        }
    }

    /// Conflict carrying the form state to redisplay
    pub fn conflict_with_form<T: serde::Serialize>(message: impl Into<String>, form: &T) -> Self {
        ApiError::Conflict {
            message: message.into(),
            form: serde_json::to_value(form).ok(),
        }
    }
}

impl From<msm_common::Error> for ApiError {
    fn from(err: msm_common::Error) -> Self {
        use msm_common::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Integrity { message, .. } => ApiError::conflict(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, form) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            ApiError::Conflict { message, form } => (StatusCode::CONFLICT, "CONFLICT", message, form),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    msg,
                    None,
                )
            }
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(form) = form {
            error["form"] = form;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use msm_common::{Error, IntegrityKind};

    #[test]
    fn test_common_errors_map_to_status() {
        let cases = [
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (
                Error::Integrity {
                    kind: IntegrityKind::Unique,
                    message: "x".into(),
                },
                StatusCode::CONFLICT,
            ),
            (Error::Concurrency("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
