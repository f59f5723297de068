//! # Error Types
//!
//! Domain-specific error types for turnstile-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  turnstile-core errors (this file)                                      │
//! │  ├── CoreError        - Ledger / drawer rule violations                 │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  turnstile-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  turnstile-sync errors (separate crate)                                 │
//! │  └── SyncError        - Delivery failures, never shown to ledger callers│
//! │                                                                         │
//! │  Terminal API errors (in app)                                           │
//! │  └── ApiError         - What the UI/kiosk sees (serialized)             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → Caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Taxonomy
//! Every `CoreError` maps onto exactly one [`ErrorKind`]:
//!
//! | Kind                  | Meaning                                   | Entity state |
//! |-----------------------|-------------------------------------------|--------------|
//! | `Validation`          | Malformed input, caller fixes and retries | untouched    |
//! | `StateConflict`       | Wrong-state operation                     | untouched    |
//! | `InsufficientPayment` | Cash tendered below amount due            | untouched    |
//! | `NotFound`            | Unknown transaction / session id          | n/a          |

use thiserror::Error;

use crate::money::{CurrencyCode, Money};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a [`CoreError`], used by the API layer to pick
/// an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    InsufficientPayment,
    NotFound,
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger and drawer business rule violations.
///
/// Returned before any mutation happens: an operation that fails with a
/// `CoreError` leaves the entity exactly as it was.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The item list cannot be priced.
    ///
    /// ## When This Occurs
    /// - Empty item list
    /// - A quantity of zero or less
    /// - More lines than a single transaction allows
    /// - A subtotal too large to represent
    #[error("Invalid items: {reason}")]
    InvalidItems { reason: String },

    /// Cash tendered does not cover the amount due.
    ///
    /// ## User Workflow
    /// ```text
    /// Amount due: 30.00 USD (incl. tip)
    ///      │
    ///      ▼
    /// Tendered: 20.00 USD
    ///      │
    ///      ▼
    /// InsufficientPayment { due: 30.00, tendered: 20.00 }
    ///      │
    ///      ▼
    /// UI shows: "Collect 10.00 more"
    /// ```
    #[error("Insufficient payment: due {due}, tendered {tendered}")]
    InsufficientPayment { due: Money, tendered: Money },

    /// Refund would push completed refunds past the transaction total.
    #[error(
        "Refund of {requested} exceeds remaining refundable amount {remaining} on transaction {transaction_id}"
    )]
    RefundExceedsTotal {
        transaction_id: String,
        requested: Money,
        remaining: Money,
    },

    /// Entity is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Voiding a completed transaction
    /// - Capturing payment on a voided transaction
    /// - Refunding a transaction that is pending or already fully refunded
    /// - Counting a drawer that is already being counted
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
        operation: &'static str,
    },

    /// Staff member already has a drawer session open.
    #[error("Staff {staff_id} already has open drawer session {session_id}")]
    DrawerAlreadyOpen { staff_id: String, session_id: String },

    /// The drawer session is not open (closed, or never opened).
    #[error("No open drawer session: {0}")]
    NoOpenSession(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Drawer session not found: {0}")]
    SessionNotFound(String),

    /// An amount was given in a different currency than the deployment uses.
    #[error("Currency mismatch: expected {expected}, got {found}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        found: CurrencyCode,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Maps the error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidItems { .. }
            | CoreError::CurrencyMismatch { .. }
            | CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InsufficientPayment { .. } => ErrorKind::InsufficientPayment,
            CoreError::RefundExceedsTotal { .. }
            | CoreError::InvalidState { .. }
            | CoreError::DrawerAlreadyOpen { .. }
            | CoreError::NoOpenSession(_) => ErrorKind::StateConflict,
            CoreError::TransactionNotFound(_) | CoreError::SessionNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }

    /// Shorthand for an [`CoreError::InvalidState`] on a transaction.
    pub(crate) fn transaction_state(id: &str, status: impl ToString, operation: &'static str) -> Self {
        CoreError::InvalidState {
            entity: "Transaction",
            id: id.to_string(),
            status: status.to_string(),
            operation,
        }
    }

    /// Shorthand for an [`CoreError::InvalidState`] on a drawer session.
    pub(crate) fn session_state(id: &str, status: impl ToString, operation: &'static str) -> Self {
        CoreError::InvalidState {
            entity: "Drawer session",
            id: id.to_string(),
            status: status.to_string(),
            operation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., card suffix, country code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
