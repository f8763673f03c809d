//! API error types with IntoResponse
//!
//! Write failures become a plain-text 500 carrying the error description.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::executor::WriteError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Transaction failed and was rolled back (500)
    Write(WriteError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Write(e) => {
                tracing::error!(stage = %e.stage, error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to insert records to DB: {e}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}
