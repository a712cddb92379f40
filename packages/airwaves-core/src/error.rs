//! Centralized error types for the Airwaves core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::stream::upstream::UpstreamError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for UpstreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "upstream_request_failed",
            Self::HttpStatus(_) => "upstream_error_status",
            Self::ChannelClosed => "relay_channel_closed",
        }
    }
}

/// Application-wide error type for the relay.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RelayError {
    /// Requested station ID is not in the registry.
    #[error("Station not found: {0}")]
    StationNotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Relay configuration error (invalid tunables, bad station list).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RelayError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StationNotFound(_) => "station_not_found",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StationNotFound(_) => StatusCode::NOT_FOUND,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Players and the query layer key off this exact body for unknown stations.
        if let Self::StationNotFound(_) = self {
            return (status, Json(json!({ "status": "Not found" }))).into_response();
        }

        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}
