//! # API Error Type
//!
//! Unified error type for terminal commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Turnstile                              │
//! │                                                                         │
//! │  Caller (UI / kiosk)         Terminal                                   │
//! │  ───────────────────         ────────                                   │
//! │                                                                         │
//! │  refund(txn, 10.00)                                                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function  ──►  ApiResult<T>                             │  │
//! │  │                                                                  │  │
//! │  │  CoreError ── kind() ──► VALIDATION_ERROR / STATE_CONFLICT /     │  │
//! │  │                          INSUFFICIENT_PAYMENT / NOT_FOUND        │  │
//! │  │  DbError ──────────────► NOT_FOUND / STATE_CONFLICT /            │  │
//! │  │                          DATABASE_ERROR                          │  │
//! │  │  SyncError ────────────► INTERNAL_ERROR (sync operations only)   │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "STATE_CONFLICT",                                            │
//! │    "message": "Refund of 25.00 USD exceeds remaining ..." }             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is returned before anything is committed, so the entity the
//! caller named is unchanged and can be re-read.

use serde::Serialize;
use turnstile_core::{CoreError, ErrorKind};
use turnstile_db::DbError;
use turnstile_sync::SyncError;

/// Result type alias for terminal commands.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error returned from terminal commands.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "Transaction not found: txn-123"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed input; nothing was changed.
    ValidationError,

    /// Wrong state for the operation, or a concurrent writer got there first.
    StateConflict,

    /// Cash tendered below the amount due.
    InsufficientPayment,

    /// Resource not found.
    NotFound,

    /// Database operation failed.
    DatabaseError,

    /// Internal error.
    InternalError,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    /// Creates a state conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::StateConflict, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::InternalError, message)
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = match err.kind() {
            ErrorKind::Validation => ErrorCode::ValidationError,
            ErrorKind::StateConflict => ErrorCode::StateConflict,
            ErrorKind::InsufficientPayment => ErrorCode::InsufficientPayment,
            ErrorKind::NotFound => ErrorCode::NotFound,
        };
        ApiError::new(code, err.to_string())
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => {
                ApiError::conflict(format!("{} '{}' already exists", field, value))
            }
            DbError::VersionConflict { .. } => {
                tracing::warn!("Lost update detected: {}", err);
                ApiError::conflict(format!("{}; reload and try again", err))
            }
            DbError::StateConflict { .. } => ApiError::conflict(err.to_string()),
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::Serialization(e) => {
                tracing::error!("Stored record could not be decoded: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Stored record is unreadable")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts sync errors to API errors (sync commands only; delivery errors
/// never reach ledger callers).
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::DatabaseError(e) => ApiError::new(ErrorCode::DatabaseError, e),
            e if e.is_config_error() => ApiError::validation(e.to_string()),
            e => ApiError::internal(e.to_string()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_core::{CurrencyCode, Money};

    #[test]
    fn test_core_errors_map_by_kind() {
        let usd = |m| Money::new(m, CurrencyCode::USD);

        let err: ApiError = CoreError::InsufficientPayment {
            due: usd(3000),
            tendered: usd(2000),
        }
        .into();
        assert_eq!(err.code, ErrorCode::InsufficientPayment);

        let err: ApiError = CoreError::TransactionNotFound("txn-1".into()).into();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err: ApiError = CoreError::NoOpenSession("drw-1".into()).into();
        assert_eq!(err.code, ErrorCode::StateConflict);
    }

    #[test]
    fn test_db_errors() {
        let err: ApiError = DbError::version_conflict("Transaction", "txn-1", 3).into();
        assert_eq!(err.code, ErrorCode::StateConflict);

        let err: ApiError = DbError::state_conflict("Sync entry", "7", "is pending, not failed").into();
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(err.message, "Sync entry 7 is pending, not failed");

        let err: ApiError = DbError::QueryFailed("syntax error near SELECT".into()).into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("syntax"));
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ApiError::conflict("Transaction txn-1 is voided")).unwrap();
        assert_eq!(json["code"], "STATE_CONFLICT");
        assert_eq!(json["message"], "Transaction txn-1 is voided");
    }
}
