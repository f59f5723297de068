//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────┐  ┌─────────────────────┐ │
//! │  │  Configuration  │  │  Delivery (retry)   │  │  Delivery (final)   │ │
//! │  │                 │  │                     │  │                     │ │
//! │  │  InvalidConfig  │  │  ConnectionFailed   │  │  Rejected           │ │
//! │  │  InvalidUrl     │  │  Timeout            │  │  InvalidPayload     │ │
//! │  │                 │  │  RemoteUnavailable  │  │                     │ │
//! │  └─────────────────┘  └─────────────────────┘  └─────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────┐                           │
//! │  │    Database     │  │      Internal       │                           │
//! │  │  DatabaseError  │  │  ShuttingDown       │                           │
//! │  │                 │  │  ChannelError       │                           │
//! │  └─────────────────┘  └─────────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery errors stay inside the worker. A ledger caller never sees one:
//! retryable errors reschedule the entry, final errors park it as failed.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Delivery Errors (retryable)
    // =========================================================================
    /// The remote could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote did not answer in time.
    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    /// The remote answered 408, 429 or 5xx.
    #[error("Remote unavailable (HTTP {status}): {message}")]
    RemoteUnavailable { status: u16, message: String },

    // =========================================================================
    // Delivery Errors (final)
    // =========================================================================
    /// The remote refused the entry; retrying the same payload cannot help.
    #[error("Remote rejected entry (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The stored payload is not valid JSON.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Worker is shutting down.
    #[error("Sync worker is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<turnstile_db::DbError> for SyncError {
    fn from(err: turnstile_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Maps a non-success HTTP status onto the retry taxonomy.
    ///
    /// 408, 429 and 5xx are transient; any other status is a rejection.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => SyncError::RemoteUnavailable { status, message },
            _ => SyncError::Rejected { status, message },
        }
    }

    /// Returns true if delivery may succeed on a later attempt.
    ///
    /// ## Retryable Errors
    /// - Connection failures (network issues)
    /// - Timeouts
    /// - 408 / 429 / 5xx answers
    /// - Local database hiccups while recording the outcome
    ///
    /// ## Non-Retryable Errors
    /// - Rejections and unreadable payloads
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Timeout(_)
                | SyncError::RemoteUnavailable { .. }
                | SyncError::DatabaseError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(self, SyncError::InvalidConfig(_) | SyncError::InvalidUrl(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::from_status(503, "down").is_retryable());
        assert!(SyncError::from_status(429, "slow down").is_retryable());
        assert!(SyncError::from_status(408, "timeout").is_retryable());

        assert!(!SyncError::from_status(422, "bad payload").is_retryable());
        assert!(!SyncError::from_status(401, "unauthorized").is_retryable());
        assert!(!SyncError::InvalidPayload("eof".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("nope".into()).is_config_error());
        assert!(!SyncError::Timeout(1).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Rejected {
            status: 422,
            message: "unknown event".into(),
        };
        assert_eq!(err.to_string(), "Remote rejected entry (HTTP 422): unknown event");
    }
}
