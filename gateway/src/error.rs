//! Gateway Error Taxonomy
//!
//! One error type for every rejected or failed call. Each response body
//! carries the triggering request's identifier so callers can correlate
//! with their own logs.

use axum::http::header::HeaderValue;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Categories of gateway failure.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Caller address is not inside any allowlisted range.
    #[error("caller address is not allowlisted")]
    AdmissionDenied,

    /// Missing, invalid, or stale signature material.
    #[error("{0}")]
    AuthenticationFailed(&'static str),

    /// Request or burst ceiling exceeded.
    #[error("too many requests, wait {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Malformed payload.
    #[error("{0}")]
    ValidationFailed(String),

    /// Same idempotency key, different body.
    #[error("idempotency key was reused with a different body; original record created at {original_created_at}")]
    IdempotencyConflict { original_created_at: DateTime<Utc> },

    /// Resource does not exist.
    #[error("not found")]
    NotFound,

    /// Unexpected failure; detail is logged, never surfaced.
    #[error("internal server error")]
    Internal,
}

/// A gateway error bound to the request it rejected.
#[derive(Debug)]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub request_id: String,
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// The caller-supplied request identifier, for log correlation.
    pub request_id: String,
}

impl GatewayError {
    pub fn admission_denied(request_id: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::AdmissionDenied,
            request_id: request_id.into(),
        }
    }

    pub fn auth_failed(request_id: impl Into<String>, reason: &'static str) -> Self {
        Self {
            kind: ErrorKind::AuthenticationFailed(reason),
            request_id: request_id.into(),
        }
    }

    pub fn rate_limited(request_id: impl Into<String>, retry_after: u64) -> Self {
        Self {
            kind: ErrorKind::RateLimited { retry_after },
            request_id: request_id.into(),
        }
    }

    pub fn validation(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationFailed(message.into()),
            request_id: request_id.into(),
        }
    }

    pub fn idempotency_conflict(
        request_id: impl Into<String>,
        original_created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ErrorKind::IdempotencyConflict { original_created_at },
            request_id: request_id.into(),
        }
    }

    pub fn not_found(request_id: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            request_id: request_id.into(),
        }
    }

    /// Log the underlying failure with full context and surface a
    /// generic message to the caller.
    pub fn internal(request_id: impl Into<String>, source: impl std::fmt::Display) -> Self {
        let request_id = request_id.into();
        error!(request_id = %request_id, error = %source, "Internal gateway error");
        Self {
            kind: ErrorKind::Internal,
            request_id,
        }
    }

    /// The machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self.kind {
            ErrorKind::AdmissionDenied => "ADMISSION_DENIED",
            ErrorKind::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            ErrorKind::RateLimited { .. } => "RATE_LIMITED",
            ErrorKind::ValidationFailed(_) => "VALIDATION_FAILED",
            ErrorKind::IdempotencyConflict { .. } => "IDEMPOTENCY_CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// The HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::AdmissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ErrorKind::IdempotencyConflict { .. } => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match self.kind {
            ErrorKind::RateLimited { retry_after } => Some(retry_after),
            _ => None,
        };

        let body = Json(ErrorResponse {
            code: self.code().to_string(),
            message: self.kind.to_string(),
            request_id: self.request_id,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(v) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("Retry-After", v);
            }
        }
        response
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
