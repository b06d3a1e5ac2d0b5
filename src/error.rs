//! Error types for the gallery gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors
///
/// `Clone` so a single deduplicated failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider throttled the call
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Transport-level failure talking to the RPC or HTTP endpoint
    #[error("Network error: {0}")]
    Network(String),

    /// JSON-RPC error object returned by the provider
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Non-2xx HTTP response
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Malformed JSON or ABI payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// On-chain rejection
    #[error("Contract reverted: {}", reason.as_deref().unwrap_or("no reason given"))]
    Revert { reason: Option<String> },

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (bad address, malformed URI, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Client-side ownership check refused the operation
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Explicit timeout elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Persisted cache write exceeded its quota
    #[error("Storage quota exceeded: {0}")]
    StorageQuota(String),

    /// Request was cancelled before it ran
    #[error("Request cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            AppError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if e.is_decode() {
            AppError::Parse(e.to_string())
        } else {
            AppError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Parse(e.to_string())
    }
}

impl From<alloy_sol_types::Error> for AppError {
    fn from(e: alloy_sol_types::Error) -> Self {
        AppError::Parse(format!("ABI decode failed: {}", e))
    }
}

impl AppError {
    /// A revert or missing item: the caller should render a "not found"/"burned" state
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Revert { .. })
    }
}

/// Error response structure for API
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, status, reason) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error", "configuration_error"),
            AppError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "retry", "rate_limited"),
            AppError::Network(_) => (StatusCode::BAD_GATEWAY, "retry", "network_error"),
            AppError::Rpc { .. } => (StatusCode::BAD_GATEWAY, "retry", "rpc_error"),
            AppError::Http { .. } => (StatusCode::BAD_GATEWAY, "retry", "upstream_http_error"),
            AppError::Parse(_) => (StatusCode::BAD_GATEWAY, "error", "malformed_response"),
            AppError::Revert { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "rejected", "contract_revert"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "rejected", "not_found"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "rejected", "validation_failed"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "rejected", "not_authorized"),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "retry", "timeout"),
            AppError::StorageQuota(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error", "storage_quota"),
            AppError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "retry", "cancelled"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "error", "internal_error"),
        };

        let error_response = ErrorResponse {
            status,
            reason: reason.to_string(),
            details: Some(self.to_string()),
        };

        // Log the error
        tracing::error!(
            error_type = %self,
            status_code = %status_code,
            "Request error"
        );

        (status_code, Json(json!(error_response))).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
