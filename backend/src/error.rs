use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use togglsync_shared::api::ErrorResponse;

use crate::services::gcal::GoogleCalendarError;
use crate::services::toggl::TogglApiError;

#[derive(Debug)]
pub enum AppError {
    Database(diesel::result::Error),
    NotFound(String),
    Validation(String),
    Unauthorized(String),
    Toggl(TogglApiError),
    Google(GoogleCalendarError),
    Internal(anyhow::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::Toggl(e) => write!(f, "Toggl API error: {}", e),
            Self::Google(e) => write!(f, "Google Calendar error: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::Database(diesel::result::Error::NotFound) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", "record not found"),
            ),
            Self::Database(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("database_error", e.to_string()),
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new("not_found", msg)),
            Self::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("validation_error", msg),
            ),
            Self::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("unauthorized", msg),
            ),
            Self::Toggl(e) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("toggl_error", e.to_string()),
            ),
            Self::Google(e) => (
                StatusCode::BAD_GATEWAY,
                ErrorResponse::new("google_error", e.to_string()),
            ),
            Self::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal_error", e.to_string()),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Surface diesel NotFound wrapped by the db layer as a 404
        match err.downcast::<diesel::result::Error>() {
            Ok(e) => Self::Database(e),
            Err(e) => Self::Internal(e),
        }
    }
}

impl From<TogglApiError> for AppError {
    fn from(err: TogglApiError) -> Self {
        Self::Toggl(err)
    }
}

impl From<GoogleCalendarError> for AppError {
    fn from(err: GoogleCalendarError) -> Self {
        Self::Google(err)
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for AppError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        Self::Internal(anyhow::anyhow!("failed to get database connection: {err}"))
    }
}

pub type ApiResult<T> = Result<T, AppError>;
