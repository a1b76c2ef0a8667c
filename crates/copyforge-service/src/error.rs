//! API error types and responses.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use copyforge_metering::{GatewayError, LedgerError};
use copyforge_providers::SelectorError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - idempotency key reused or already settled.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits available after outstanding reservations.
        available: i64,
        /// Required amount.
        required: i64,
    },

    /// An operation with the same idempotency key is still running.
    #[error("operation {0} is already in progress")]
    DuplicateInFlight(String),

    /// Every generation provider failed and at least one was rate limited.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Seconds the caller should wait.
        retry_after: u64,
        /// Provider failures.
        message: String,
    },

    /// Generation providers failed.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// The ledger store cannot serve the request.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::DuplicateInFlight(key) => (
                StatusCode::CONFLICT,
                "duplicate_in_flight",
                format!("Operation {key} is already in progress, retry later"),
                None,
            ),
            Self::RateLimited {
                retry_after,
                message,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("Content providers are busy, try again in {retry_after} seconds"),
                Some(serde_json::json!({
                    "retry_after": retry_after,
                    "providers": message
                })),
            ),
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
            Self::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "Ledger store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "The service is temporarily unavailable".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(id) => Self::NotFound(format!("Account not found: {id}")),
            LedgerError::NotFound(key) => Self::NotFound(format!("No operation recorded for {key}")),
            LedgerError::InvalidAmount(msg) => Self::BadRequest(msg),
            LedgerError::KeyConflict(key) => {
                Self::Conflict(format!("Idempotency key {key} was already used"))
            }
            LedgerError::AlreadyCommitted(id) | LedgerError::AlreadyReversed(id) => {
                Self::Conflict(format!("Entry {id} is already settled"))
            }
            LedgerError::Store(e) => Self::ServiceUnavailable(e.to_string()),
            LedgerError::Contention(n) => {
                Self::ServiceUnavailable(format!("ledger contention after {n} attempts"))
            }
            LedgerError::UnsupportedStore => {
                Self::Internal("ledger store cannot make writes atomic".into())
            }
        }
    }
}

impl From<SelectorError> for ApiError {
    fn from(err: SelectorError) -> Self {
        match err.retry_after() {
            Some(retry_after) => Self::RateLimited {
                retry_after,
                message: err.to_string(),
            },
            None => Self::ExternalService(err.to_string()),
        }
    }
}

impl From<GatewayError<SelectorError>> for ApiError {
    fn from(err: GatewayError<SelectorError>) -> Self {
        match err {
            GatewayError::InsufficientFunds {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            GatewayError::DuplicateInFlight { key } => Self::DuplicateInFlight(key.to_string()),
            GatewayError::AlreadyCompleted { entry_id } => Self::Conflict(format!(
                "Operation already completed as entry {entry_id}; its result is no longer available"
            )),
            GatewayError::Ledger(e) => e.into(),
            GatewayError::Operation(e) => e.into(),
        }
    }
}
