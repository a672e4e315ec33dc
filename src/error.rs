//! Crate-wide error taxonomy.
//!
//! Every service operation returns [`AppError`]. Infrastructure errors
//! (cache, rate-limit store) have their own types and are translated at the
//! service boundary according to the propagation policy of each component.

use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed URL, alias or request field.
    #[error("{message}")]
    Validation { message: String, details: Value },
    /// Short code rejected before any store access.
    #[error("{message}")]
    InvalidShortCode { message: String, details: Value },
    #[error("{message}")]
    NotFound { message: String, details: Value },
    #[error("{message}")]
    Expired { message: String, details: Value },
    #[error("{message}")]
    Inactive { message: String, details: Value },
    /// Alias already taken or idempotent-URL mismatch.
    #[error("{message}")]
    Conflict { message: String, details: Value },
    #[error("{message}")]
    RateLimitExceeded { message: String, details: Value },
    /// Code-space exhaustion, corrupted store data and other server faults.
    #[error("{message}")]
    Internal { message: String, details: Value },
    /// A remote call timed out or the backend is unreachable. Not retryable
    /// when a write timed out and its outcome is unknown.
    #[error("{message}")]
    Unavailable {
        message: String,
        details: Value,
        retryable: bool,
    },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }
    pub fn invalid_short_code(message: impl Into<String>, details: Value) -> Self {
        Self::InvalidShortCode {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn expired(message: impl Into<String>, details: Value) -> Self {
        Self::Expired {
            message: message.into(),
            details,
        }
    }
    pub fn inactive(message: impl Into<String>, details: Value) -> Self {
        Self::Inactive {
            message: message.into(),
            details,
        }
    }
    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }
    pub fn rate_limited(message: impl Into<String>, details: Value) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }
    pub fn unavailable(message: impl Into<String>, details: Value) -> Self {
        Self::Unavailable {
            message: message.into(),
            details,
            retryable: true,
        }
    }
    /// A write whose deadline elapsed; it may or may not have been applied.
    pub fn outcome_unknown(message: impl Into<String>, details: Value) -> Self {
        Self::Unavailable {
            message: message.into(),
            details,
            retryable: false,
        }
    }

    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::InvalidShortCode { .. } => "invalid_short_code",
            AppError::NotFound { .. } => "not_found",
            AppError::Expired { .. } => "expired",
            AppError::Inactive { .. } => "inactive",
            AppError::Conflict { .. } => "conflict",
            AppError::RateLimitExceeded { .. } => "rate_limited",
            AppError::Internal { .. } => "internal_error",
            AppError::Unavailable { .. } => "unavailable",
        }
    }

    pub fn details(&self) -> &Value {
        match self {
            AppError::Validation { details, .. }
            | AppError::InvalidShortCode { details, .. }
            | AppError::NotFound { details, .. }
            | AppError::Expired { details, .. }
            | AppError::Inactive { details, .. }
            | AppError::Conflict { details, .. }
            | AppError::RateLimitExceeded { details, .. }
            | AppError::Internal { details, .. }
            | AppError::Unavailable { details, .. } => details,
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Unavailable { retryable, .. } => *retryable,
            AppError::RateLimitExceeded { .. } => true,
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = serde_json::to_value(&errors).unwrap_or_else(|_| json!({}));
        AppError::bad_request("Request validation failed", details)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        map_sqlx_error(e)
    }
}

pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    if let Some(db) = e.as_database_error()
        && db.is_unique_violation()
    {
        return AppError::conflict(
            "Unique constraint violation",
            json!({ "constraint": db.constraint() }),
        );
    }

    if matches!(e, sqlx::Error::PoolTimedOut) {
        return AppError::unavailable("Database pool timed out", json!({}));
    }

    tracing::error!(error = %e, "Database error");
    AppError::internal("Database error", json!({}))
}
