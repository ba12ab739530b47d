//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.
//! Expected business outcomes of payment matching (no pending request,
//! amount mismatch, ...) are not errors; see `services::reconciliation`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::provider::ProviderError;
use crate::store::StoreError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Infrastructure Errors**: the store or configuration failed
/// - **Authentication Errors**: invalid API key or webhook secret
/// - **Resource Errors**: requested records not found
/// - **Business Logic Errors**: operations that violate ledger rules
/// - **Validation Errors**: invalid request data
/// - **Upstream Errors**: the SMM provider refused or failed
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backing store failed for a reason other than a SQL error.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook secret or signature is missing or wrong.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid webhook secret")]
    InvalidWebhookSecret,

    /// Caller is authenticated but may not act on this resource.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Returns HTTP 404 Not Found.
    #[error("{0} not found")]
    NotFound(String),

    /// Wallet balance is lower than the charge.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: String, available: String },

    /// The operation lost a race or repeats a completed one.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Server configuration is incomplete.
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Server misconfigured: {0}")]
    Config(String),

    /// The SMM provider failed or returned an error payload.
    ///
    /// Returns HTTP 502 Bad Gateway with the provider's message.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::InsufficientBalance { needed, available } => {
                AppError::InsufficientBalance {
                    needed: crate::money::from_paise(needed).to_string(),
                    available: crate::money::from_paise(available).to_string(),
                }
            }
            StoreError::Unavailable(msg) => AppError::StoreUnavailable(msg),
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured => {
                AppError::Config("SMM provider API is not configured".to_string())
            }
            other => AppError::Provider(other.to_string()),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Store failures hide their details from the client and are logged instead.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidWebhookSecret => (
                StatusCode::UNAUTHORIZED,
                "invalid_webhook_secret",
                self.to_string(),
            ),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InsufficientBalance { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_balance",
                self.to_string(),
            ),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "missing_config",
                self.to_string(),
            ),
            AppError::Provider(ref msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg.clone()),
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::StoreUnavailable(ref msg) => {
                tracing::error!(error = %msg, "store unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
