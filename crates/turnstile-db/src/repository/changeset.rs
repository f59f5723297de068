//! # Change Sets
//!
//! Everything one ledger mutation writes, committed as a unit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ChangeSet                                                              │
//! │  ├── transaction   Insert | Update(version check)          (optional)   │
//! │  ├── session       Insert | Update(version check)          (optional)   │
//! │  ├── cash_movement append                                  (optional)   │
//! │  └── sync          queue entries, payload = entity snapshot             │
//! │                                                                         │
//! │  Database::commit ──► BEGIN ─► writes in the order above ─► COMMIT      │
//! │                       any error ─► ROLLBACK, nothing visible            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};
use crate::repository::{drawer, sync_queue, transaction};
use turnstile_core::ledger::LedgerOutcome;
use turnstile_core::sync::{SyncEntityType, SyncIntent};
use turnstile_core::{CashDrawerSession, CashMovement, Transaction};

#[derive(Debug, Clone)]
enum Write<T> {
    Insert(T),
    Update(T),
}

impl<T> Write<T> {
    fn record(&self) -> &T {
        match self {
            Write::Insert(record) | Write::Update(record) => record,
        }
    }
}

/// Pending writes for one mutation.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    transaction: Option<Write<Transaction>>,
    session: Option<Write<CashDrawerSession>>,
    cash_movement: Option<CashMovement>,
    sync: Vec<SyncIntent>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// Builds the change set for a ledger outcome.
    ///
    /// `drawer` is the staff member's session after the outcome's cash
    /// movement was applied to it; the movement is attributed to it.
    pub fn from_ledger(
        outcome: LedgerOutcome,
        drawer: Option<CashDrawerSession>,
        is_new: bool,
    ) -> Self {
        let mut changes = if is_new {
            ChangeSet::new().insert_transaction(outcome.transaction)
        } else {
            ChangeSet::new().update_transaction(outcome.transaction)
        };

        if let Some(mut movement) = outcome.cash_movement {
            if let Some(session) = &drawer {
                movement.session_id = Some(session.id.clone());
            }
            changes = changes.cash_movement(movement);
        }
        if let Some(session) = drawer {
            changes = changes.update_session(session);
        }

        changes.enqueue(outcome.sync)
    }

    pub fn insert_transaction(mut self, txn: Transaction) -> Self {
        self.transaction = Some(Write::Insert(txn));
        self
    }

    pub fn update_transaction(mut self, txn: Transaction) -> Self {
        self.transaction = Some(Write::Update(txn));
        self
    }

    pub fn insert_session(mut self, session: CashDrawerSession) -> Self {
        self.session = Some(Write::Insert(session));
        self
    }

    pub fn update_session(mut self, session: CashDrawerSession) -> Self {
        self.session = Some(Write::Update(session));
        self
    }

    pub fn cash_movement(mut self, movement: CashMovement) -> Self {
        self.cash_movement = Some(movement);
        self
    }

    /// Adds queue entries. Accepts an `Option` straight from an outcome.
    pub fn enqueue(mut self, intents: impl IntoIterator<Item = SyncIntent>) -> Self {
        self.sync.extend(intents);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transaction.is_none()
            && self.session.is_none()
            && self.cash_movement.is_none()
            && self.sync.is_empty()
    }

    /// Runs every write on `conn`. The caller owns BEGIN/COMMIT.
    pub(crate) async fn apply(&self, conn: &mut SqliteConnection) -> DbResult<()> {
        match &self.transaction {
            Some(Write::Insert(txn)) => transaction::insert(conn, txn).await?,
            Some(Write::Update(txn)) => transaction::update(conn, txn).await?,
            None => {}
        }

        match &self.session {
            Some(Write::Insert(session)) => drawer::insert_session(conn, session).await?,
            Some(Write::Update(session)) => drawer::update_session(conn, session).await?,
            None => {}
        }

        if let Some(movement) = &self.cash_movement {
            drawer::insert_movement(conn, movement).await?;
        }

        for intent in &self.sync {
            let (payload, at) = self.snapshot_for(intent)?;
            sync_queue::enqueue(conn, intent, &payload, at).await?;
        }

        Ok(())
    }

    /// JSON snapshot of the entity an intent refers to, plus its timestamp.
    fn snapshot_for(&self, intent: &SyncIntent) -> DbResult<(String, chrono::DateTime<chrono::Utc>)> {
        let missing = || {
            DbError::Internal(format!(
                "sync intent {} for {} has no matching record in the change set",
                intent.operation.name(),
                intent.entity_id
            ))
        };

        match intent.entity_type() {
            SyncEntityType::Transaction => {
                let txn = self
                    .transaction
                    .as_ref()
                    .map(Write::record)
                    .filter(|t| t.id == intent.entity_id)
                    .ok_or_else(missing)?;
                Ok((serde_json::to_string(txn)?, txn.updated_at))
            }
            SyncEntityType::DrawerSession => {
                let session = self
                    .session
                    .as_ref()
                    .map(Write::record)
                    .filter(|s| s.id == intent.entity_id)
                    .ok_or_else(missing)?;
                Ok((serde_json::to_string(session)?, session.updated_at))
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use turnstile_core::drawer::{apply_cash_movement, open_session, OpenDrawer};
    use turnstile_core::fraud::{FraudContext, FraudScreen};
    use turnstile_core::ledger::{
        capture_payment, create_transaction, CapturePayment, LineItemInput, NewTransaction, Tender,
    };
    use turnstile_core::sync::SyncOperation;
    use turnstile_core::{CurrencyCode, Money, Settings, TransactionStatus};

    fn usd(minor: i64) -> Money {
        Money::new(minor, CurrencyCode::USD)
    }

    fn new_sale(settings: &Settings) -> LedgerOutcome {
        create_transaction(
            settings,
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
        .unwrap()
    }

    #[tokio::test]
    async fn test_cash_capture_commits_all_parts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = Settings::default();

        let drawer = open_session(
            &settings,
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
        db.commit(ChangeSet::new().insert_session(drawer.session.clone()).enqueue(drawer.sync))
            .await
            .unwrap();

        let created = new_sale(&settings);
        db.commit(ChangeSet::from_ledger(created.clone(), None, true))
            .await
            .unwrap();

        let captured = capture_payment(
            &created.transaction,
            &settings,
            CapturePayment {
                tender: Tender::Cash {
                    amount_tendered: usd(3000),
                },
                tip: None,
            },
            &FraudScreen::empty(),
            &FraudContext::default(),
            Utc::now(),
        )
        .unwrap();
        let movement = captured.cash_movement.clone().unwrap();
        let session = apply_cash_movement(&drawer.session, &movement, Utc::now()).unwrap();

        db.commit(ChangeSet::from_ledger(captured, Some(session), false))
            .await
            .unwrap();

        let stored = db.transactions().get(&created.transaction.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);

        let stored_drawer = db.drawers().get(&drawer.session.id).await.unwrap();
        assert_eq!(stored_drawer.expected_balance, usd(10_000 + 2700));

        let movements = db.drawers().movements_for_session(&drawer.session.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].amount, usd(2700));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_nothing_behind() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let created = new_sale(&Settings::default());

        // The intent names a record that is not part of the change set.
        let changes = ChangeSet::new()
            .insert_transaction(created.transaction.clone())
            .enqueue(Some(SyncIntent::new("someone-else", SyncOperation::CreateTransaction)));

        assert!(matches!(db.commit(changes).await, Err(DbError::Internal(_))));
        assert!(db
            .transactions()
            .get_by_id(&created.transaction.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(db.sync_queue().stats().await.unwrap().pending, 0);
    }

    #[test]
    fn test_empty_change_set() {
        assert!(ChangeSet::new().is_empty());
        assert!(ChangeSet::new().enqueue(None).is_empty());
    }
}
