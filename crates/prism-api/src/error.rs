//! API error type and JSON error response formatting.
//!
//! Maps internal errors to HTTP status codes with a consistent
//! `{error, status, execution_time}` body, mirroring the success shape.

use std::time::Instant;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use prism_core::error::PrismError;

use crate::handlers::format_elapsed;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Always "error".
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
}

/// API error carrying its HTTP status and the request's elapsed time.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub execution_time: Option<String>,
}

impl ApiError {
    /// 400 with the request's elapsed time attached.
    pub fn bad_request(message: impl Into<String>, started: Instant) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            execution_time: Some(format_elapsed(started)),
        }
    }

    /// Map an internal error to its HTTP status, attaching elapsed time.
    pub fn from_error(err: PrismError, started: Instant) -> Self {
        let status = match &err {
            PrismError::MalformedRequest(_) | PrismError::Config(_) => StatusCode::BAD_REQUEST,
            PrismError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PrismError::ChannelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            execution_time: Some(format_elapsed(started)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            status: "error".to_string(),
            execution_time: self.execution_time,
        };
        (self.status, Json(body)).into_response()
    }
}
