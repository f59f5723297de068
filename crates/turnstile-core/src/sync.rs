//! # Sync Records
//!
//! What the ledger and drawer emit for the durable sync queue.
//!
//! ## Idempotency Keys
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation              Key                              Priority      │
//! │  ─────────────────────  ───────────────────────────────  ────────      │
//! │  create_transaction     {txn_id}:create                  10            │
//! │  capture_payment        {txn_id}:capture                 10            │
//! │  refund                 {txn_id}:refund:{refund_id}      10            │
//! │  void_transaction       {txn_id}:void                    10            │
//! │  open_drawer            {session_id}:open                5             │
//! │  close_drawer           {session_id}:close               5             │
//! │                                                                         │
//! │  The key is derived only from ids, so replaying a mutation produces    │
//! │  the same key and the remote acceptor drops the duplicate.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Processing and drawer counting are local-only and never synced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// Priority of transaction entries (delivered before drawer entries).
pub const TRANSACTION_PRIORITY: i64 = 10;

/// Priority of drawer session entries.
pub const DRAWER_PRIORITY: i64 = 5;

// =============================================================================
// Entity & Operation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    Transaction,
    DrawerSession,
}

impl SyncEntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncEntityType::Transaction => "transaction",
            SyncEntityType::DrawerSession => "drawer_session",
        }
    }

    pub const fn priority(&self) -> i64 {
        match self {
            SyncEntityType::Transaction => TRANSACTION_PRIORITY,
            SyncEntityType::DrawerSession => DRAWER_PRIORITY,
        }
    }
}

/// A mutation that must reach the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncOperation {
    CreateTransaction,
    CapturePayment,
    Refund { refund_id: String },
    VoidTransaction,
    OpenDrawer,
    CloseDrawer,
}

impl SyncOperation {
    /// Name stored in the queue's `operation_type` column.
    pub const fn name(&self) -> &'static str {
        match self {
            SyncOperation::CreateTransaction => "create_transaction",
            SyncOperation::CapturePayment => "capture_payment",
            SyncOperation::Refund { .. } => "refund",
            SyncOperation::VoidTransaction => "void_transaction",
            SyncOperation::OpenDrawer => "open_drawer",
            SyncOperation::CloseDrawer => "close_drawer",
        }
    }

    pub const fn entity_type(&self) -> SyncEntityType {
        match self {
            SyncOperation::OpenDrawer | SyncOperation::CloseDrawer => SyncEntityType::DrawerSession,
            _ => SyncEntityType::Transaction,
        }
    }

    /// Entity id plus an operation discriminator.
    pub fn idempotency_key(&self, entity_id: &str) -> String {
        match self {
            SyncOperation::CreateTransaction => format!("{}:create", entity_id),
            SyncOperation::CapturePayment => format!("{}:capture", entity_id),
            SyncOperation::Refund { refund_id } => format!("{}:refund:{}", entity_id, refund_id),
            SyncOperation::VoidTransaction => format!("{}:void", entity_id),
            SyncOperation::OpenDrawer => format!("{}:open", entity_id),
            SyncOperation::CloseDrawer => format!("{}:close", entity_id),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sync record requested by a ledger or drawer operation.
///
/// The payload (the entity snapshot after the mutation) is serialized by the
/// persistence layer when the entry is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIntent {
    pub entity_id: String,
    pub operation: SyncOperation,
}

impl SyncIntent {
    pub fn new(entity_id: impl Into<String>, operation: SyncOperation) -> Self {
        SyncIntent {
            entity_id: entity_id.into(),
            operation,
        }
    }

    #[inline]
    pub fn entity_type(&self) -> SyncEntityType {
        self.operation.entity_type()
    }

    #[inline]
    pub fn idempotency_key(&self) -> String {
        self.operation.idempotency_key(&self.entity_id)
    }

    #[inline]
    pub fn priority(&self) -> i64 {
        self.entity_type().priority()
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntryStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Exceeded the retry ceiling or was rejected; needs manual resolution.
    Failed,
}

/// A durable queue entry. Removed only after the remote ledger accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncQueueEntry {
    /// Auto-incrementing sequence; defines enqueue order.
    pub id: i64,
    pub operation_type: String,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    /// Entity snapshot as JSON.
    pub payload: String,
    pub idempotency_key: String,
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
    pub attempts: i64,
    pub priority: i64,
    pub status: SyncEntryStatus,
    pub last_error: Option<String>,
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_keys() {
        assert_eq!(
            SyncOperation::CreateTransaction.idempotency_key("t1"),
            "t1:create"
        );
        assert_eq!(
            SyncOperation::Refund {
                refund_id: "r9".into()
            }
            .idempotency_key("t1"),
            "t1:refund:r9"
        );
        assert_eq!(SyncOperation::CloseDrawer.idempotency_key("d1"), "d1:close");
    }

    #[test]
    fn test_priorities_favor_transactions() {
        let capture = SyncIntent::new("t1", SyncOperation::CapturePayment);
        let open = SyncIntent::new("d1", SyncOperation::OpenDrawer);
        assert!(capture.priority() > open.priority());
        assert_eq!(open.entity_type(), SyncEntityType::DrawerSession);
    }
}
