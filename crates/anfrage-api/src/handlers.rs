//! API request handlers

pub mod cron;
pub mod health;
pub mod inquiries;
pub mod queue;
pub mod settings;
pub mod tickets;

use anfrage_common::Error;
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error type
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

/// Build an error response
pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a domain error; server-side details are logged, not returned
pub fn api_error(e: Error) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %e, "Request failed");
        let message = match e {
            Error::Transport(_) => e.to_string(),
            _ => "Internal server error".to_string(),
        };
        return error_response(status, e.code(), message);
    }
    error_response(status, e.code(), e.to_string())
}

/// Map a bare status code from the auth helpers
pub fn status_error(status: StatusCode) -> ApiError {
    let code = match status {
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        _ => "INTERNAL_ERROR",
    };
    error_response(
        status,
        code,
        status.canonical_reason().unwrap_or("Request failed"),
    )
}

/// Clamp a requested page size
pub(crate) fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_hides_internal_details() {
        let (status, Json(body)) = api_error(Error::Database("password=hunter2".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "DATABASE_ERROR");
        assert!(!body.message.contains("hunter2"));

        let (status, Json(body)) = api_error(Error::NotFound("Ticket 1".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.message, "Not found: Ticket 1");
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(page_limit(None), 50);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(10_000)), 200);
    }
}
