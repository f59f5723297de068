//! # Transaction Repository
//!
//! Persistence for [`Transaction`] records.
//!
//! ## Storage Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transactions row                                                       │
//! │                                                                         │
//! │  scalar columns            JSON columns             derived on read     │
//! │  ──────────────            ────────────             ───────────────     │
//! │  id, event_id, status      items_json               sync_status         │
//! │  subtotal/tax/tip/...      customer_json            (from sync_queue)   │
//! │  created_ms, version       refund_history_json                          │
//! │  customer_key              fraud_alerts_json                            │
//! │                            payment_details_json                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `sync_status` is never written. It is computed from the queue: any failed
//! entry for the record means `failed`, any pending entry means `pending`,
//! no entries means `synced`. Writes therefore cannot clobber a delivery the
//! worker recorded in between.
//!
//! Writes happen only through [`crate::Database::commit`]; this module
//! exposes the row-level helpers it uses.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use turnstile_core::{
    CurrencyCode, Money, PaymentMethod, SyncStatus, Transaction, TransactionStatus,
};

/// Column list shared by every read, with the derived sync status.
const SELECT_TRANSACTION: &str = r#"
    SELECT
        t.id, t.event_id, t.staff_id, t.device_id, t.currency, t.status,
        t.payment_method, t.subtotal_minor, t.tax_minor, t.tip_minor,
        t.discount_minor, t.total_minor, t.customer_json, t.items_json,
        t.payment_details_json, t.refund_history_json, t.fraud_alerts_json,
        t.void_reason, t.voided_by, t.created_at, t.updated_at, t.completed_at,
        t.version,
        CASE
            WHEN EXISTS (
                SELECT 1 FROM sync_queue q
                WHERE q.entity_type = 'transaction' AND q.entity_id = t.id
                  AND q.status = 'failed'
            ) THEN 'failed'
            WHEN EXISTS (
                SELECT 1 FROM sync_queue q
                WHERE q.entity_type = 'transaction' AND q.entity_id = t.id
            ) THEN 'pending'
            ELSE 'synced'
        END AS sync_status
    FROM transactions t
"#;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    event_id: String,
    staff_id: String,
    device_id: Option<String>,
    currency: String,
    status: TransactionStatus,
    payment_method: Option<PaymentMethod>,
    subtotal_minor: i64,
    tax_minor: i64,
    tip_minor: i64,
    discount_minor: i64,
    total_minor: i64,
    customer_json: Option<String>,
    items_json: String,
    payment_details_json: Option<String>,
    refund_history_json: String,
    fraud_alerts_json: String,
    void_reason: Option<String>,
    voided_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    version: i64,
    sync_status: SyncStatus,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DbError;

    fn try_from(row: TransactionRow) -> DbResult<Self> {
        let currency = parse_currency(&row.currency)?;
        let money = |minor| Money::new(minor, currency);

        Ok(Transaction {
            id: row.id,
            event_id: row.event_id,
            staff_id: row.staff_id,
            device_id: row.device_id,
            customer: row
                .customer_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            items: serde_json::from_str(&row.items_json)?,
            subtotal: money(row.subtotal_minor),
            tax_amount: money(row.tax_minor),
            tip_amount: money(row.tip_minor),
            discount_amount: money(row.discount_minor),
            total_amount: money(row.total_minor),
            payment_method: row.payment_method,
            payment_details: row
                .payment_details_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            status: row.status,
            refund_history: serde_json::from_str(&row.refund_history_json)?,
            fraud_alerts: serde_json::from_str(&row.fraud_alerts_json)?,
            sync_status: row.sync_status,
            void_reason: row.void_reason,
            voided_by: row.voided_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            version: row.version,
        })
    }
}

pub(crate) fn parse_currency(code: &str) -> DbResult<CurrencyCode> {
    code.parse()
        .map_err(|e| DbError::Serialization(format!("stored currency '{code}': {e}")))
}

/// JSON-encoded nested fields, computed once per write.
struct EncodedTransaction {
    customer_key: Option<String>,
    customer_json: Option<String>,
    items_json: String,
    payment_details_json: Option<String>,
    refund_history_json: String,
    fraud_alerts_json: String,
}

impl EncodedTransaction {
    fn new(txn: &Transaction) -> DbResult<Self> {
        Ok(EncodedTransaction {
            customer_key: txn.customer.as_ref().and_then(|c| c.key()),
            customer_json: txn.customer.as_ref().map(serde_json::to_string).transpose()?,
            items_json: serde_json::to_string(&txn.items)?,
            payment_details_json: txn
                .payment_details
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            refund_history_json: serde_json::to_string(&txn.refund_history)?,
            fraud_alerts_json: serde_json::to_string(&txn.fraud_alerts)?,
        })
    }
}

// =============================================================================
// Writes (called inside Database::commit)
// =============================================================================

/// Inserts a new record. A reused id surfaces as [`DbError::UniqueViolation`].
pub(crate) async fn insert(conn: &mut SqliteConnection, txn: &Transaction) -> DbResult<()> {
    let encoded = EncodedTransaction::new(txn)?;

    debug!(id = %txn.id, event_id = %txn.event_id, "Inserting transaction");

    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, event_id, staff_id, device_id, customer_key, currency, status,
            payment_method, subtotal_minor, tax_minor, tip_minor, discount_minor,
            total_minor, refunded_minor, customer_json, items_json,
            payment_details_json, refund_history_json, fraud_alerts_json,
            void_reason, voided_by, created_at, updated_at, completed_at,
            created_ms, updated_ms, completed_ms, version
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
        )
        "#,
    )
    .bind(&txn.id)
    .bind(&txn.event_id)
    .bind(&txn.staff_id)
    .bind(&txn.device_id)
    .bind(&encoded.customer_key)
    .bind(txn.currency().as_str())
    .bind(txn.status)
    .bind(txn.payment_method)
    .bind(txn.subtotal.minor())
    .bind(txn.tax_amount.minor())
    .bind(txn.tip_amount.minor())
    .bind(txn.discount_amount.minor())
    .bind(txn.total_amount.minor())
    .bind(txn.refunded_amount().minor())
    .bind(&encoded.customer_json)
    .bind(&encoded.items_json)
    .bind(&encoded.payment_details_json)
    .bind(&encoded.refund_history_json)
    .bind(&encoded.fraud_alerts_json)
    .bind(&txn.void_reason)
    .bind(&txn.voided_by)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .bind(txn.completed_at)
    .bind(txn.created_at.timestamp_millis())
    .bind(txn.updated_at.timestamp_millis())
    .bind(txn.completed_at.map(|t| t.timestamp_millis()))
    .bind(txn.version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Writes `txn` over the stored row if the stored version is `txn.version - 1`.
///
/// Identity columns (event, staff, device, customer, items, created_at)
/// never change after creation and are not rewritten.
pub(crate) async fn update(conn: &mut SqliteConnection, txn: &Transaction) -> DbResult<()> {
    let encoded = EncodedTransaction::new(txn)?;
    let expected_version = txn.version - 1;

    debug!(id = %txn.id, version = txn.version, status = %txn.status, "Updating transaction");

    let result = sqlx::query(
        r#"
        UPDATE transactions SET
            status = ?1,
            payment_method = ?2,
            tip_minor = ?3,
            total_minor = ?4,
            refunded_minor = ?5,
            payment_details_json = ?6,
            refund_history_json = ?7,
            fraud_alerts_json = ?8,
            void_reason = ?9,
            voided_by = ?10,
            updated_at = ?11,
            completed_at = ?12,
            updated_ms = ?13,
            completed_ms = ?14,
            version = ?15
        WHERE id = ?16 AND version = ?17
        "#,
    )
    .bind(txn.status)
    .bind(txn.payment_method)
    .bind(txn.tip_amount.minor())
    .bind(txn.total_amount.minor())
    .bind(txn.refunded_amount().minor())
    .bind(&encoded.payment_details_json)
    .bind(&encoded.refund_history_json)
    .bind(&encoded.fraud_alerts_json)
    .bind(&txn.void_reason)
    .bind(&txn.voided_by)
    .bind(txn.updated_at)
    .bind(txn.completed_at)
    .bind(txn.updated_at.timestamp_millis())
    .bind(txn.completed_at.map(|t| t.timestamp_millis()))
    .bind(txn.version)
    .bind(&txn.id)
    .bind(expected_version)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::version_conflict("Transaction", &txn.id, expected_version));
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to transactions.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Loads one record.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let sql = format!("{SELECT_TRANSACTION} WHERE t.id = ?1");
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Transaction::try_from).transpose()
    }

    /// Loads one record or fails with [`DbError::NotFound`].
    pub async fn get(&self, id: &str) -> DbResult<Transaction> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Transaction", id))
    }

    /// All records for an event in creation order.
    pub async fn list_by_event(&self, event_id: &str) -> DbResult<Vec<Transaction>> {
        let sql = format!("{SELECT_TRANSACTION} WHERE t.event_id = ?1 ORDER BY t.created_ms, t.id");
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// Records of an event that completed or were created in `[start, end)`.
    ///
    /// This is the candidate set for a daily report; the report itself
    /// decides which records count for what.
    pub async fn list_for_report(
        &self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Transaction>> {
        let sql = format!(
            "{SELECT_TRANSACTION}
             WHERE t.event_id = ?1
               AND ((t.completed_ms >= ?2 AND t.completed_ms < ?3)
                    OR (t.created_ms >= ?2 AND t.created_ms < ?3))
             ORDER BY t.created_ms, t.id"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(event_id)
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// Captures by the same customer at or after `since`, not counting `exclude_id`.
    ///
    /// Feeds the velocity fraud rule.
    pub async fn count_customer_captures(
        &self,
        customer_key: &str,
        since: DateTime<Utc>,
        exclude_id: &str,
    ) -> DbResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE customer_key = ?1
              AND status IN ('completed', 'refunded')
              AND completed_ms >= ?2
              AND id != ?3
            "#,
        )
        .bind(customer_key)
        .bind(since.timestamp_millis())
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
