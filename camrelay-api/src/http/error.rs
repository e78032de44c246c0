// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert core errors to HTTP errors
impl From<camrelay_core::Error> for AppError {
    fn from(err: camrelay_core::Error) -> Self {
        use camrelay_core::Error;

        match err {
            Error::InvalidUrl(msg) => Self::bad_request(format!("invalid source URL: {msg}")),
            Error::ProbeTimeout { .. } | Error::ProbeConnect { .. } => {
                Self::bad_request(err.to_string())
            }
            Error::DecoderLaunch { .. } => {
                tracing::error!("decoder launch failed: {err}");
                Self::internal("failed to start stream")
            }
            Error::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                Self::internal("internal server error")
            }
        }
    }
}
