//! # Transaction Commands
//!
//! ## Mutation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(txn) ─► read ─► turnstile_core::ledger::* ─► (lock(drawer) ─►     │
//! │  apply cash) ─► Database::commit(ChangeSet) ─► unlock                   │
//! │                                                                         │
//! │  The ChangeSet carries the transaction row, the cash movement, the     │
//! │  drawer's new expected balance and the sync queue entry. One SQLite    │
//! │  transaction: all of it lands or none of it does.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sync delivery is never awaited here; the worker picks the entry up later.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use turnstile_core::drawer::apply_cash_movement;
use turnstile_core::fraud::FraudContext;
use turnstile_core::ledger::{
    self, CapturePayment, LedgerOutcome, NewTransaction, RefundRequest, VoidRequest,
};
use turnstile_core::settings::TipSuggestion;
use turnstile_core::{CashDrawerSession, CashMovement, Settings, Transaction};
use turnstile_db::{ChangeSet, Database};

use crate::error::ApiResult;
use crate::state::{DbState, EntityLocks, ReportCache, SettingsState};

/// Prices and records a new pending transaction.
pub async fn create_transaction(
    db: &DbState,
    settings: &SettingsState,
    reports: &ReportCache,
    input: NewTransaction,
) -> ApiResult<Transaction> {
    debug!(event_id = %input.event_id, items = input.items.len(), "create_transaction command");

    let outcome = ledger::create_transaction(&settings.current(), input, Utc::now())?;
    let transaction = outcome.transaction.clone();
    db.inner()
        .commit(ChangeSet::from_ledger(outcome, None, true))
        .await?;
    reports.invalidate_event(&transaction.event_id);

    info!(
        transaction_id = %transaction.id,
        total = %transaction.total_amount,
        items = transaction.items.len(),
        "Transaction created"
    );
    Ok(transaction)
}

/// Marks a pending transaction as talking to a gateway.
pub async fn begin_processing(
    db: &DbState,
    locks: &EntityLocks,
    transaction_id: &str,
) -> ApiResult<Transaction> {
    debug!(transaction_id, "begin_processing command");
    let _guard = locks.transaction(transaction_id).await;

    let current = db.inner().transactions().get(transaction_id).await?;
    let updated = ledger::begin_processing(&current, Utc::now())?;
    db.inner()
        .commit(ChangeSet::new().update_transaction(updated.clone()))
        .await?;

    Ok(updated)
}

/// Returns a processing transaction to pending.
pub async fn abandon_processing(
    db: &DbState,
    locks: &EntityLocks,
    transaction_id: &str,
) -> ApiResult<Transaction> {
    debug!(transaction_id, "abandon_processing command");
    let _guard = locks.transaction(transaction_id).await;

    let current = db.inner().transactions().get(transaction_id).await?;
    let updated = ledger::abandon_processing(&current, Utc::now())?;
    db.inner()
        .commit(ChangeSet::new().update_transaction(updated.clone()))
        .await?;

    Ok(updated)
}

/// Records payment, screens for fraud and completes the transaction.
///
/// Cash captures credit the staff member's open drawer in the same commit.
pub async fn capture_payment(
    db: &DbState,
    settings: &SettingsState,
    locks: &EntityLocks,
    reports: &ReportCache,
    transaction_id: &str,
    capture: CapturePayment,
) -> ApiResult<Transaction> {
    debug!(transaction_id, "capture_payment command");
    let _guard = locks.transaction(transaction_id).await;

    let db_inner: &Database = db.inner();
    let current = db_inner.transactions().get(transaction_id).await?;
    let now = Utc::now();
    let settings_now = settings.current();
    let context = fraud_context(db_inner, &current, &settings_now, now).await?;

    let outcome = ledger::capture_payment(
        &current,
        &settings_now,
        capture,
        settings.fraud_screen(),
        &context,
        now,
    )?;

    for alert in &outcome.transaction.fraud_alerts {
        warn!(
            transaction_id,
            kind = ?alert.kind,
            severity = ?alert.severity,
            "Fraud alert raised"
        );
    }

    let transaction = commit_with_cash(db_inner, locks, outcome, now).await?;
    reports.invalidate_event(&transaction.event_id);

    info!(
        transaction_id,
        total = %transaction.total_amount,
        method = ?transaction.payment_method,
        "Payment captured"
    );
    Ok(transaction)
}

/// Refunds part or all of a completed transaction.
///
/// Replaying a request with a `refund_id` that is already recorded returns
/// the transaction as stored and writes nothing.
pub async fn refund_transaction(
    db: &DbState,
    locks: &EntityLocks,
    reports: &ReportCache,
    transaction_id: &str,
    request: RefundRequest,
) -> ApiResult<Transaction> {
    debug!(transaction_id, amount = %request.amount, "refund_transaction command");
    let _guard = locks.transaction(transaction_id).await;

    let db_inner: &Database = db.inner();
    let current = db_inner.transactions().get(transaction_id).await?;
    let now = Utc::now();
    let outcome = ledger::refund(&current, request, now)?;

    if outcome.transaction.version == current.version {
        debug!(transaction_id, "Refund already recorded");
        return Ok(current);
    }

    let transaction = commit_with_cash(db_inner, locks, outcome, now).await?;
    reports.invalidate_event(&transaction.event_id);

    info!(
        transaction_id,
        refunded = %transaction.refunded_amount(),
        status = %transaction.status,
        "Refund recorded"
    );
    Ok(transaction)
}

/// Cancels an unpaid transaction.
pub async fn void_transaction(
    db: &DbState,
    locks: &EntityLocks,
    reports: &ReportCache,
    transaction_id: &str,
    request: VoidRequest,
) -> ApiResult<Transaction> {
    debug!(transaction_id, "void_transaction command");
    let _guard = locks.transaction(transaction_id).await;

    let current = db.inner().transactions().get(transaction_id).await?;
    let outcome = ledger::void_transaction(&current, request, Utc::now())?;
    let transaction = outcome.transaction.clone();
    db.inner()
        .commit(ChangeSet::from_ledger(outcome, None, false))
        .await?;
    reports.invalidate_event(&transaction.event_id);

    info!(transaction_id, "Transaction voided");
    Ok(transaction)
}

pub async fn get_transaction(db: &DbState, transaction_id: &str) -> ApiResult<Transaction> {
    Ok(db.inner().transactions().get(transaction_id).await?)
}

/// All transactions of an event, oldest first.
pub async fn list_transactions(db: &DbState, event_id: &str) -> ApiResult<Vec<Transaction>> {
    Ok(db.inner().transactions().list_by_event(event_id).await?)
}

/// Tip amounts for the configured presets, on the amount currently due.
pub async fn suggested_tips(
    db: &DbState,
    settings: &SettingsState,
    transaction_id: &str,
) -> ApiResult<Vec<TipSuggestion>> {
    let transaction = db.inner().transactions().get(transaction_id).await?;
    Ok(settings.current().suggested_tips(transaction.total_amount))
}

// =============================================================================
// Helpers
// =============================================================================

/// Counts the customer's recent captures for the velocity rule.
async fn fraud_context(
    db: &Database,
    transaction: &Transaction,
    settings: &Settings,
    now: DateTime<Utc>,
) -> ApiResult<FraudContext> {
    let customer_key = transaction.customer.as_ref().and_then(|c| c.key());
    let recent_customer_captures = match customer_key {
        Some(key) if settings.velocity_limit > 0 => {
            let since = i64::try_from(settings.velocity_window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            db.transactions()
                .count_customer_captures(&key, since, &transaction.id)
                .await?
        }
        _ => 0,
    };

    Ok(FraudContext {
        recent_customer_captures,
    })
}

/// Commits a ledger outcome, crediting or debiting the staff member's
/// drawer when cash moved. Takes the drawer lock after the transaction lock
/// the caller already holds.
async fn commit_with_cash(
    db: &Database,
    locks: &EntityLocks,
    outcome: LedgerOutcome,
    now: DateTime<Utc>,
) -> ApiResult<Transaction> {
    let transaction = outcome.transaction.clone();

    let Some(movement) = outcome.cash_movement.clone() else {
        db.commit(ChangeSet::from_ledger(outcome, None, false)).await?;
        return Ok(transaction);
    };

    let _drawer_guard = locks.drawer(&movement.staff_id).await;
    let drawer = attribute_cash(db, &movement, now).await?;
    db.commit(ChangeSet::from_ledger(outcome, drawer, false))
        .await?;

    Ok(transaction)
}

/// The staff member's drawer after `movement`, or `None` when no drawer is
/// open. The sale goes through either way.
async fn attribute_cash(
    db: &Database,
    movement: &CashMovement,
    now: DateTime<Utc>,
) -> ApiResult<Option<CashDrawerSession>> {
    match db.drawers().active_for_staff(&movement.staff_id).await? {
        Some(session) => Ok(Some(apply_cash_movement(&session, movement, now)?)),
        None => {
            warn!(
                staff_id = %movement.staff_id,
                transaction_id = %movement.transaction_id,
                amount = %movement.amount,
                "Cash moved with no open drawer; recorded unattributed"
            );
            Ok(None)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::drawer::{close_drawer_session, open_drawer_session};
    use crate::error::ErrorCode;
    use crate::test_support::{cash, line, new_sale, terminal, usd};
    use std::sync::Arc;
    use turnstile_core::drawer::{CloseDrawer, OpenDrawer};
    use turnstile_core::ledger::{GatewayOutcome, Tender};
    use turnstile_core::{
        BalanceStatus, CashCount, Customer, PaymentDetails, PaymentMethod, RefundStatus,
        SyncStatus, TransactionStatus,
    };

    fn refund_request(minor: i64, method: PaymentMethod) -> RefundRequest {
        RefundRequest {
            refund_id: None,
            amount: usd(minor),
            reason: "Customer request".into(),
            staff_id: "staff-1".into(),
            method,
            outcome: GatewayOutcome::Approved,
            gateway_reference: None,
        }
    }

    #[tokio::test]
    async fn test_sale_refund_lifecycle() {
        let t = terminal().await;

        // $10.00 ×2 + $5.00 ×1 at 8% → 25.00 + 2.00
        let txn = create_transaction(
            &t.db,
            &t.settings,
            &t.reports,
            new_sale(vec![line("adult", 1000, 2), line("child", 500, 1)]),
        )
        .await
        .unwrap();
        assert_eq!(txn.subtotal, usd(2500));
        assert_eq!(txn.tax_amount, usd(200));
        assert_eq!(txn.status, TransactionStatus::Pending);
        assert_eq!(txn.sync_status, SyncStatus::Pending);

        let txn = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: cash(3500),
                tip: Some(usd(300)),
            },
        )
        .await
        .unwrap();
        assert_eq!(txn.total_amount, usd(3000));
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert!(txn.totals_balance());
        assert_eq!(
            txn.payment_details,
            Some(PaymentDetails::Cash {
                amount_tendered: usd(3500),
                change_given: usd(500),
            })
        );

        let txn = refund_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &txn.id,
            refund_request(1000, PaymentMethod::Cash),
        )
        .await
        .unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.refund_history.len(), 1);

        let txn = refund_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &txn.id,
            refund_request(2000, PaymentMethod::Cash),
        )
        .await
        .unwrap();
        assert_eq!(txn.status, TransactionStatus::Refunded);

        let err = refund_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &txn.id,
            refund_request(1, PaymentMethod::Cash),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);

        let stored = get_transaction(&t.db, &txn.id).await.unwrap();
        assert_eq!(stored.version, txn.version);
        assert!(stored.totals_balance());
    }

    #[tokio::test]
    async fn test_insufficient_cash_changes_nothing() {
        let t = terminal().await;
        let txn = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 2500, 1)]))
            .await
            .unwrap();

        let err = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: cash(2000),
                tip: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientPayment);

        let stored = get_transaction(&t.db, &txn.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.version, txn.version);
    }

    #[tokio::test]
    async fn test_void_rules() {
        let t = terminal().await;
        let pending = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 2500, 1)]))
            .await
            .unwrap();

        let processing = begin_processing(&t.db, &t.locks, &pending.id).await.unwrap();
        assert_eq!(processing.status, TransactionStatus::Processing);

        let voided = void_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &pending.id,
            VoidRequest {
                reason: "Walked away".into(),
                staff_id: "staff-1".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(voided.status, TransactionStatus::Voided);

        let completed = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 2500, 1)]))
            .await
            .unwrap();
        let completed = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &completed.id,
            CapturePayment {
                tender: Tender::Card {
                    card_brand: Some("visa".into()),
                    last4: "4242".into(),
                    auth_code: "A1B2C3".into(),
                },
                tip: None,
            },
        )
        .await
        .unwrap();

        let err = void_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &completed.id,
            VoidRequest {
                reason: "Too late".into(),
                staff_id: "staff-1".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(
            get_transaction(&t.db, &completed.id).await.unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cash_moves_drawer_and_variance_does_not_block_close() {
        let t = terminal().await;
        let session = open_drawer_session(
            &t.db,
            &t.settings,
            &t.locks,
            OpenDrawer {
                session_id: None,
                staff_id: "staff-1".into(),
                event_id: "evt-1".into(),
                device_id: None,
                opening_balance: usd(10_000),
            },
        )
        .await
        .unwrap();

        let mut sale = new_sale(vec![line("ga", 2500, 1)]);
        sale.items[0].tax_rate_bps = Some(0);
        let txn = create_transaction(&t.db, &t.settings, &t.reports, sale).await.unwrap();
        capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: cash(2500),
                tip: None,
            },
        )
        .await
        .unwrap();
        let drawer = t.db.inner().drawers().get(&session.id).await.unwrap();
        assert_eq!(drawer.expected_balance, usd(12_500));

        refund_transaction(
            &t.db,
            &t.locks,
            &t.reports,
            &txn.id,
            refund_request(1000, PaymentMethod::Cash),
        )
        .await
        .unwrap();
        let drawer = t.db.inner().drawers().get(&session.id).await.unwrap();
        assert_eq!(drawer.expected_balance, usd(11_500));

        let summary = close_drawer_session(
            &t.db,
            &t.locks,
            &session.id,
            CloseDrawer {
                counts: vec![
                    CashCount::new(usd(10_000), 1),
                    CashCount::new(usd(1_000), 1),
                    CashCount::new(usd(100), 4),
                ],
                notes: Some("Short one dollar".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.counted, usd(11_400));
        assert_eq!(summary.variance, usd(-100));
        assert_eq!(summary.balance, BalanceStatus::Short);

        let movements = t.db.inner().drawers().movements_for_session(&session.id).await.unwrap();
        assert_eq!(movements.len(), 2);
    }

    #[tokio::test]
    async fn test_cash_sale_without_drawer_is_unattributed() {
        let t = terminal().await;
        let txn = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 2500, 1)]))
            .await
            .unwrap();
        let txn = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: cash(5000),
                tip: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(txn.status, TransactionStatus::Completed);

        let movements = t
            .db
            .inner()
            .drawers()
            .movements_for_transaction(&txn.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert!(movements[0].session_id.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refunds_cannot_exceed_total() {
        let t = Arc::new(terminal().await);
        let txn = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();
        let txn = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: Tender::DigitalWallet {
                    wallet: "apple_pay".into(),
                    auth_code: "W123".into(),
                },
                tip: None,
            },
        )
        .await
        .unwrap();

        // 1080 total; two refunds of 600 race for it.
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let t = t.clone();
                let id = txn.id.clone();
                tokio::spawn(async move {
                    refund_transaction(
                        &t.db,
                        &t.locks,
                        &t.reports,
                        &id,
                        refund_request(600, PaymentMethod::DigitalWallet),
                    )
                    .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);

        let stored = get_transaction(&t.db, &txn.id).await.unwrap();
        assert_eq!(stored.refunded_amount(), usd(600));
    }

    #[tokio::test]
    async fn test_refund_replay_and_declined_refund() {
        let t = terminal().await;
        let txn = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();
        let txn = capture_payment(
            &t.db,
            &t.settings,
            &t.locks,
            &t.reports,
            &txn.id,
            CapturePayment {
                tender: cash(2000),
                tip: None,
            },
        )
        .await
        .unwrap();

        let mut request = refund_request(500, PaymentMethod::Cash);
        request.refund_id = Some("rf-1".into());
        let first = refund_transaction(&t.db, &t.locks, &t.reports, &txn.id, request.clone())
            .await
            .unwrap();
        let replay = refund_transaction(&t.db, &t.locks, &t.reports, &txn.id, request)
            .await
            .unwrap();
        assert_eq!(replay.version, first.version);
        assert_eq!(replay.refund_history.len(), 1);

        let mut declined = refund_request(300, PaymentMethod::Card);
        declined.outcome = GatewayOutcome::Declined;
        let after = refund_transaction(&t.db, &t.locks, &t.reports, &txn.id, declined)
            .await
            .unwrap();
        assert_eq!(after.refund_history.len(), 2);
        assert_eq!(after.refund_history[1].status, RefundStatus::Failed);
        assert_eq!(after.refunded_amount(), usd(500));
    }

    #[tokio::test]
    async fn test_settings_update_applies_to_new_transactions_only() {
        let t = terminal().await;
        let before = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();

        t.settings
            .update(Settings {
                tax_rate_bps: 1000,
                ..t.settings.current()
            })
            .unwrap();
        let after = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();

        assert_eq!(before.tax_amount, usd(80));
        assert_eq!(after.tax_amount, usd(100));
        assert_eq!(
            get_transaction(&t.db, &before.id).await.unwrap().tax_amount,
            usd(80)
        );
    }

    #[tokio::test]
    async fn test_repeat_customer_raises_velocity_alert() {
        let t = terminal().await;
        t.settings
            .update(Settings {
                velocity_limit: 1,
                ..t.settings.current()
            })
            .unwrap();

        let mut last = None;
        for _ in 0..2 {
            let mut sale = new_sale(vec![line("ga", 1000, 1)]);
            sale.customer = Some(Customer {
                id: Some("cust-1".into()),
                name: None,
                email: None,
                country: None,
            });
            let txn = create_transaction(&t.db, &t.settings, &t.reports, sale).await.unwrap();
            last = Some(
                capture_payment(
                    &t.db,
                    &t.settings,
                    &t.locks,
                    &t.reports,
                    &txn.id,
                    CapturePayment {
                        tender: cash(2000),
                        tip: None,
                    },
                )
                .await
                .unwrap(),
            );
        }

        let last = last.unwrap();
        assert_eq!(last.status, TransactionStatus::Completed);
        assert!(!last.fraud_alerts.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let t = terminal().await;
        let err = begin_processing(&t.db, &t.locks, "missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let tips = suggested_tips(&t.db, &t.settings, "missing").await.unwrap_err();
        assert_eq!(tips.code, ErrorCode::NotFound);
    }
}
