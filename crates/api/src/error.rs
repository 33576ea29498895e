//! Error types and handling
//!
//! Centralized error handling with structured logging and observability.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Caller input failed constraint checks. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ingestion rejected due to back-pressure; caller may retry after backoff.
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Malformed rule, condition, or reward configuration.
    #[error("Invalid rule config: {0}")]
    InvalidRuleConfig(String),

    /// Wallet balance invariant would be violated.
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Invalid state transition on a wallet transfer.
    #[error("Transfer state error: {0}")]
    TransferState(String),

    /// Underlying store failure.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Operation cancelled; propagated upward without further processing.
    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response body
///
/// The wire shape is fixed: every failing endpoint returns
/// `{ "error": "<human string>" }`.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log_error();

        let status = match &self {
            AppError::Validation(_) | AppError::InvalidRuleConfig(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InsufficientBalance(_) | AppError::TransferState(_) => StatusCode::CONFLICT,
            AppError::Cancelled
            | AppError::Repository(_)
            | AppError::Internal(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

// ============================================================================
// ERROR KIND CONSTANTS (for log field consistency)
// ============================================================================

pub mod error_kinds {
    /// Input validation failed
    pub const VALIDATION: &str = "validation";
    /// Resource does not exist
    pub const NOT_FOUND: &str = "not_found";
    /// Ingestion queue at capacity
    pub const QUEUE_FULL: &str = "queue_full";
    /// Rule configuration rejected
    pub const INVALID_RULE_CONFIG: &str = "invalid_rule_config";
    /// Wallet balance invariant violation
    pub const INSUFFICIENT_BALANCE: &str = "insufficient_balance";
    /// Transfer state machine violation
    pub const TRANSFER_STATE: &str = "transfer_state";
    /// Store operation failed
    pub const REPOSITORY: &str = "repository";
    /// Operation cancelled
    pub const CANCELLED: &str = "cancelled";
    /// Internal server error
    pub const INTERNAL: &str = "internal";
    /// Configuration error
    pub const CONFIG: &str = "config";
}

// ============================================================================
// CONSTRUCTOR HELPERS (for ergonomic error creation)
// ============================================================================

impl AppError {
    /// Create Validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Create NotFound error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    /// Create QueueFull error
    pub fn queue_full(msg: impl Into<String>) -> Self {
        AppError::QueueFull(msg.into())
    }

    /// Create InvalidRuleConfig error
    pub fn invalid_rule(msg: impl Into<String>) -> Self {
        AppError::InvalidRuleConfig(msg.into())
    }

    /// Create InsufficientBalance error
    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        AppError::InsufficientBalance(msg.into())
    }

    /// Create TransferState error
    pub fn transfer_state(msg: impl Into<String>) -> Self {
        AppError::TransferState(msg.into())
    }

    /// Create Repository error
    pub fn repository(msg: impl Into<String>) -> Self {
        AppError::Repository(msg.into())
    }

    /// Create Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Create Configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Config(msg.into())
    }

    /// Whether the error is the cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Log error with consistent structured format
    fn log_error(&self) {
        match self {
            // Client errors: warn level (caller input caused them)
            AppError::Validation(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::VALIDATION,
                    error.message = %msg,
                    "Validation failed"
                );
            }
            AppError::NotFound(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::NOT_FOUND,
                    error.message = %msg,
                    "Resource not found"
                );
            }
            AppError::QueueFull(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::QUEUE_FULL,
                    error.message = %msg,
                    "Event rejected by back-pressure"
                );
            }
            AppError::InvalidRuleConfig(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::INVALID_RULE_CONFIG,
                    error.message = %msg,
                    "Rule configuration rejected"
                );
            }
            AppError::InsufficientBalance(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::INSUFFICIENT_BALANCE,
                    error.message = %msg,
                    "Wallet balance check failed"
                );
            }
            AppError::TransferState(msg) => {
                tracing::warn!(
                    error.kind = error_kinds::TRANSFER_STATE,
                    error.message = %msg,
                    "Invalid transfer transition"
                );
            }

            // Server errors: error level (system issue)
            AppError::Repository(msg) => {
                tracing::error!(
                    error.kind = error_kinds::REPOSITORY,
                    error.message = %msg,
                    "Repository operation failed"
                );
            }
            AppError::Cancelled => {
                tracing::debug!(error.kind = error_kinds::CANCELLED, "Operation cancelled");
            }
            AppError::Internal(msg) => {
                tracing::error!(
                    error.kind = error_kinds::INTERNAL,
                    error.message = %msg,
                    "Internal error"
                );
            }
            AppError::Config(msg) => {
                tracing::error!(
                    error.kind = error_kinds::CONFIG,
                    error.message = %msg,
                    "Configuration error"
                );
            }
        }
    }
}
