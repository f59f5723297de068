//! # Sync Queue Repository
//!
//! The durable outbox between the local ledger and the remote one.
//!
//! ## Outbox Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  LEDGER MUTATION (capture_payment, refund, close drawer, ...)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SINGLE SQL TRANSACTION (commit)                 │   │
//! │  │  1. UPDATE transactions ... WHERE id = ? AND version = ?        │   │
//! │  │  2. INSERT INTO cash_movements ...                  (optional)  │   │
//! │  │  3. INSERT INTO sync_queue (idempotency_key, payload, ...)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SYNC WORKER                                                            │
//! │  1. due(now)         → head entry of each entity, highest priority first│
//! │  2. send to remote   (idempotency key travels with it)                  │
//! │  3. ok        → mark_delivered  (row deleted)                           │
//! │     transient → reschedule      (attempts+1, next_attempt_at)           │
//! │     permanent → mark_failed     (blocks that entity until retried)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries for one entity are delivered strictly in `seq` order: only the
//! oldest remaining entry of an entity is ever handed out, and a failed or
//! not-yet-due head holds back everything behind it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use turnstile_core::sync::{SyncEntityType, SyncEntryStatus, SyncIntent, SyncQueueEntry};

#[derive(Debug, FromRow)]
struct QueueRow {
    seq: i64,
    operation_type: String,
    entity_type: SyncEntityType,
    entity_id: String,
    payload: String,
    idempotency_key: String,
    enqueued_at: DateTime<Utc>,
    attempts: i64,
    priority: i64,
    status: SyncEntryStatus,
    last_error: Option<String>,
    next_attempt_at: Option<DateTime<Utc>>,
}

impl From<QueueRow> for SyncQueueEntry {
    fn from(row: QueueRow) -> Self {
        SyncQueueEntry {
            id: row.seq,
            operation_type: row.operation_type,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            payload: row.payload,
            idempotency_key: row.idempotency_key,
            enqueued_at: row.enqueued_at,
            attempts: row.attempts,
            priority: row.priority,
            status: row.status,
            last_error: row.last_error,
            next_attempt_at: row.next_attempt_at,
        }
    }
}

/// Queue depth, for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueStats {
    pub pending: i64,
    pub failed: i64,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

/// Appends an entry inside the caller's SQL transaction.
///
/// A repeated idempotency key is ignored: the first payload for a key wins.
pub(crate) async fn enqueue(
    conn: &mut SqliteConnection,
    intent: &SyncIntent,
    payload: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let key = intent.idempotency_key();
    debug!(
        operation = intent.operation.name(),
        entity_id = %intent.entity_id,
        key = %key,
        "Queuing for sync"
    );

    let result = sqlx::query(
        r#"
        INSERT INTO sync_queue (
            operation_type, entity_type, entity_id, payload, idempotency_key,
            enqueued_at, attempts, priority, status, next_attempt_ms
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, 'pending', 0)
        ON CONFLICT(idempotency_key) DO NOTHING
        "#,
    )
    .bind(intent.operation.name())
    .bind(intent.entity_type())
    .bind(&intent.entity_id)
    .bind(payload)
    .bind(&key)
    .bind(now)
    .bind(intent.priority())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(key = %key, "Sync entry already queued");
    }

    Ok(())
}

/// Repository for sync queue operations.
#[derive(Debug, Clone)]
pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncQueueRepository { pool }
    }

    /// Entries ready to send at `now`.
    ///
    /// At most one entry per entity (its oldest), ordered by priority then
    /// enqueue order.
    pub async fn due(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<SyncQueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            r#"
            SELECT * FROM sync_queue q
            WHERE q.status = 'pending'
              AND q.next_attempt_ms <= ?1
              AND q.seq = (
                  SELECT MIN(h.seq) FROM sync_queue h
                  WHERE h.entity_type = q.entity_type AND h.entity_id = q.entity_id
              )
            ORDER BY q.priority DESC, q.seq ASC
            LIMIT ?2
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SyncQueueEntry::from).collect())
    }

    /// Removes a delivered entry.
    pub async fn mark_delivered(&self, seq: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE seq = ?1")
            .bind(seq)
            .execute(&self.pool)
            .await?;

        debug!(seq, "Sync entry delivered");
        Ok(())
    }

    /// Counts an attempt and schedules the next one.
    pub async fn reschedule(
        &self,
        seq: i64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                attempts = attempts + 1,
                last_error = ?1,
                next_attempt_at = ?2,
                next_attempt_ms = ?3
            WHERE seq = ?4
            "#,
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(next_attempt_at.timestamp_millis())
        .bind(seq)
        .execute(&self.pool)
        .await?;

        debug!(seq, %next_attempt_at, "Sync entry rescheduled");
        Ok(())
    }

    /// Counts an attempt and parks the entry until an operator retries it.
    pub async fn mark_failed(&self, seq: i64, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue SET
                attempts = attempts + 1,
                last_error = ?1,
                status = 'failed',
                next_attempt_at = NULL
            WHERE seq = ?2
            "#,
        )
        .bind(error)
        .bind(seq)
        .execute(&self.pool)
        .await?;

        warn!(seq, error, "Sync entry failed");
        Ok(())
    }

    /// Puts a failed entry back in line with a fresh attempt budget.
    ///
    /// Pending entries keep their attempts and backoff: retrying one is a
    /// `StateConflict`, an unknown `seq` is `NotFound`.
    pub async fn retry(&self, seq: i64) -> DbResult<SyncQueueEntry> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                status = 'pending',
                attempts = 0,
                next_attempt_at = NULL,
                next_attempt_ms = 0
            WHERE seq = ?1 AND status = 'failed'
            "#,
        )
        .bind(seq)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Missing rows surface as NotFound from the lookup.
            self.get(seq).await?;
            return Err(DbError::state_conflict(
                "Sync entry",
                seq.to_string(),
                "is still pending; only failed entries can be retried",
            ));
        }

        debug!(seq, "Failed sync entry requeued");
        self.get(seq).await
    }

    pub async fn get(&self, seq: i64) -> DbResult<SyncQueueEntry> {
        sqlx::query_as::<_, QueueRow>("SELECT * FROM sync_queue WHERE seq = ?1")
            .bind(seq)
            .fetch_optional(&self.pool)
            .await?
            .map(SyncQueueEntry::from)
            .ok_or_else(|| DbError::not_found("Sync entry", seq.to_string()))
    }

    /// Entries that exhausted their attempts or were rejected.
    pub async fn list_failed(&self) -> DbResult<Vec<SyncQueueEntry>> {
        let rows =
            sqlx::query_as::<_, QueueRow>("SELECT * FROM sync_queue WHERE status = 'failed' ORDER BY seq")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(SyncQueueEntry::from).collect())
    }

    /// Every undelivered entry for one entity, in delivery order.
    pub async fn list_for_entity(
        &self,
        entity_type: SyncEntityType,
        entity_id: &str,
    ) -> DbResult<Vec<SyncQueueEntry>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT * FROM sync_queue WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SyncQueueEntry::from).collect())
    }

    pub async fn stats(&self) -> DbResult<SyncQueueStats> {
        let (pending, failed, oldest): (i64, i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                (SELECT enqueued_at FROM sync_queue ORDER BY seq LIMIT 1)
            FROM sync_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncQueueStats {
            pending,
            failed,
            oldest_enqueued_at: oldest,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::changeset::ChangeSet;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use turnstile_core::drawer::{open_session, OpenDrawer};
    use turnstile_core::fraud::{FraudContext, FraudScreen};
    use turnstile_core::ledger::{
        capture_payment, create_transaction, CapturePayment, LineItemInput, NewTransaction, Tender,
    };
    use turnstile_core::sync::SyncOperation;
    use turnstile_core::{CurrencyCode, Money, Settings, SyncStatus, Transaction};

    fn usd(minor: i64) -> Money {
        Money::new(minor, CurrencyCode::USD)
    }

    /// Creates and captures one sale: two queue entries for the same record.
    async fn sale(db: &Database) -> Transaction {
        let settings = Settings::default();
        let created = create_transaction(
            &settings,
            NewTransaction {
                id: None,
                event_id: "evt-1".into(),
                staff_id: "staff-1".into(),
                device_id: None,
                customer: None,
                items: vec![LineItemInput {
                    id: "ga".into(),
                    name: "General Admission".into(),
                    quantity: 1,
                    unit_price: usd(2500),
                    tax_rate_bps: None,
                    category: None,
                }],
                discount: None,
            },
            Utc::now(),
        )
        .unwrap();
        db.commit(ChangeSet::from_ledger(created.clone(), None, true))
            .await
            .unwrap();

        let captured = capture_payment(
            &created.transaction,
            &settings,
            CapturePayment {
                tender: Tender::Card {
                    card_brand: Some("visa".into()),
                    last4: "4242".into(),
                    auth_code: "A1".into(),
                },
                tip: None,
            },
            &FraudScreen::empty(),
            &FraudContext::default(),
            Utc::now(),
        )
        .unwrap();
        db.commit(ChangeSet::from_ledger(captured.clone(), None, false))
            .await
            .unwrap();
        captured.transaction
    }

    #[tokio::test]
    async fn test_only_entity_head_is_due() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let txn = sale(&db).await;
        let queue = db.sync_queue();

        let entries = queue.list_for_entity(SyncEntityType::Transaction, &txn.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation_type, "create_transaction");
        assert_eq!(entries[1].idempotency_key, format!("{}:capture", txn.id));

        let due = queue.due(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].operation_type, "create_transaction");

        queue.mark_delivered(due[0].id).await.unwrap();
        let due = queue.due(Utc::now(), 10).await.unwrap();
        assert_eq!(due[0].operation_type, "capture_payment");
        assert_eq!(
            db.transactions().get(&txn.id).await.unwrap().sync_status,
            SyncStatus::Pending
        );

        queue.mark_delivered(due[0].id).await.unwrap();
        assert!(queue.due(Utc::now(), 10).await.unwrap().is_empty());
        assert_eq!(
            db.transactions().get(&txn.id).await.unwrap().sync_status,
            SyncStatus::Synced
        );
    }

    #[tokio::test]
    async fn test_transactions_outrank_drawer_entries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let drawer = open_session(
            &Settings::default(),
            OpenDrawer {
                session_id: None,
                staff_id: "staff-1".into(),
                event_id: "evt-1".into(),
                device_id: None,
                opening_balance: usd(10_000),
            },
            None,
            Utc::now(),
        )
        .unwrap();
        db.commit(ChangeSet::new().insert_session(drawer.session).enqueue(drawer.sync))
            .await
            .unwrap();
        let txn = sale(&db).await;

        let due = db.sync_queue().due(Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].entity_id, txn.id);
        assert_eq!(due[1].entity_type, SyncEntityType::DrawerSession);
    }

    #[tokio::test]
    async fn test_reschedule_holds_back_the_entity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sale(&db).await;
        let queue = db.sync_queue();

        let head = queue.due(Utc::now(), 10).await.unwrap().remove(0);
        let later = Utc::now() + Duration::minutes(5);
        queue.reschedule(head.id, "connection refused", later).await.unwrap();

        assert!(queue.due(Utc::now(), 10).await.unwrap().is_empty());
        let due_later = queue.due(later, 10).await.unwrap();
        assert_eq!(due_later[0].id, head.id);
        assert_eq!(due_later[0].attempts, 1);
        assert_eq!(due_later[0].last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_failed_entry_blocks_until_retried() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let txn = sale(&db).await;
        let queue = db.sync_queue();

        let head = queue.due(Utc::now(), 10).await.unwrap().remove(0);
        queue.mark_failed(head.id, "rejected: 422").await.unwrap();

        assert!(queue.due(Utc::now(), 10).await.unwrap().is_empty());
        assert_eq!(queue.list_failed().await.unwrap().len(), 1);
        assert_eq!(
            db.transactions().get(&txn.id).await.unwrap().sync_status,
            SyncStatus::Failed
        );

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);
        assert!(stats.oldest_enqueued_at.is_some());

        let retried = queue.retry(head.id).await.unwrap();
        assert_eq!(retried.status, SyncEntryStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert_eq!(queue.due(Utc::now(), 10).await.unwrap()[0].id, head.id);
    }

    #[tokio::test]
    async fn test_retry_leaves_pending_entry_alone() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sale(&db).await;
        let queue = db.sync_queue();

        let head = queue.due(Utc::now(), 10).await.unwrap().remove(0);
        let later = Utc::now() + Duration::minutes(5);
        queue.reschedule(head.id, "timeout", later).await.unwrap();
        queue.reschedule(head.id, "timeout", later).await.unwrap();

        assert!(matches!(
            queue.retry(head.id).await,
            Err(DbError::StateConflict { .. })
        ));

        let entry = queue.get(head.id).await.unwrap();
        assert_eq!(entry.status, SyncEntryStatus::Pending);
        assert_eq!(entry.attempts, 2);
        assert!(queue.due(Utc::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_unknown_entry_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(matches!(
            db.sync_queue().retry(42).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_ignored() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let txn = sale(&db).await;

        // Same capture intent again, e.g. from a replayed request.
        let intent = SyncIntent::new(txn.id.clone(), SyncOperation::CapturePayment);
        let mut conn = db.pool().acquire().await.unwrap();
        enqueue(&mut conn, &intent, "{}", Utc::now()).await.unwrap();
        drop(conn);

        let entries = db
            .sync_queue()
            .list_for_entity(SyncEntityType::Transaction, &txn.id)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[1].payload, "{}");
    }
}
