//! # Transaction Ledger
//!
//! Creates, prices and mutates sale records through their state machine.
//!
//! ## Pure Transitions
//! Every operation takes the current record by reference and returns a
//! [`LedgerOutcome`]: the new record plus the effects the mutation implies.
//! Nothing is written here. The caller commits the outcome atomically, so a
//! failed operation can never leave a half-updated transaction behind.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  &Transaction ──► ledger::refund(...) ──► LedgerOutcome                 │
//! │                          │                 ├── transaction (new state)  │
//! │                          │                 ├── cash_movement (cash only)│
//! │                          │                 └── sync intent              │
//! │                          ▼                                              │
//! │                    Err(CoreError) ── nothing changes                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pricing
//! ```text
//! subtotal = Σ unit_price × quantity
//! tax      = Σ over rate groups: round_half_up(group_subtotal × rate)
//! total    = subtotal + tax + tip - discount
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::fraud::{FraudContext, FraudScreen};
use crate::money::{CurrencyCode, Money};
use crate::settings::Settings;
use crate::sync::{SyncIntent, SyncOperation};
use crate::types::{
    CashMovement, CashMovementKind, Customer, PaymentDetails, PaymentItem, PaymentMethod,
    RefundRecord, RefundStatus, SplitPayment, SyncStatus, TaxRate, Transaction,
    TransactionStatus,
};
use crate::validation::{
    validate_auth_code, validate_card_last4, validate_country_code, validate_identifier,
    validate_item_count, validate_non_negative, validate_positive, validate_quantity,
    validate_tax_rate_bps, validate_text,
};
use crate::{MAX_AMOUNT_MINOR, MAX_SPLIT_PARTS};

// =============================================================================
// Inputs
// =============================================================================

/// A line as supplied by the catalog/UI, before pricing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItemInput {
    pub id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Overrides the configured tax rate for this line.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTransaction {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub event_id: String,
    pub staff_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub customer: Option<Customer>,
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub discount: Option<Money>,
}

/// How the buyer pays. Card and wallet carry the gateway outcome as-is.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Tender {
    Cash {
        amount_tendered: Money,
    },
    Card {
        #[serde(default)]
        card_brand: Option<String>,
        last4: String,
        auth_code: String,
    },
    DigitalWallet {
        wallet: String,
        auth_code: String,
    },
    Split {
        parts: Vec<TenderPart>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenderPart {
    pub amount: Money,
    pub tender: Tender,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CapturePayment {
    pub tender: Tender,
    #[serde(default)]
    pub tip: Option<Money>,
}

/// Gateway result for a refund, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOutcome {
    #[default]
    Approved,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRequest {
    /// Caller-supplied id makes the request replay-safe; generated when absent.
    #[serde(default)]
    pub refund_id: Option<String>,
    pub amount: Money,
    pub reason: String,
    pub staff_id: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub outcome: GatewayOutcome,
    #[serde(default)]
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoidRequest {
    pub reason: String,
    pub staff_id: String,
}

// =============================================================================
// Outcome
// =============================================================================

/// The result of a ledger operation, ready to be committed as one unit.
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    pub transaction: Transaction,
    /// Present only when cash entered or left the drawer.
    pub cash_movement: Option<CashMovement>,
    /// Present when the mutation must reach the remote ledger.
    pub sync: Option<SyncIntent>,
}

impl LedgerOutcome {
    fn unchanged(transaction: &Transaction) -> Self {
        LedgerOutcome {
            transaction: transaction.clone(),
            cash_movement: None,
            sync: None,
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Prices a new transaction with the current settings. Status is `Pending`.
///
/// ## Errors
/// - `InvalidItems`: empty list, too many lines, or a quantity out of range
/// - `CurrencyMismatch`: a price or discount in another currency
/// - `Validation`: bad ids, names, tax overrides, an oversized discount, or
///   a price or total above [`MAX_AMOUNT_MINOR`]
pub fn create_transaction(
    settings: &Settings,
    input: NewTransaction,
    now: DateTime<Utc>,
) -> CoreResult<LedgerOutcome> {
    validate_identifier("event_id", &input.event_id)?;
    validate_identifier("staff_id", &input.staff_id)?;
    if let Some(id) = &input.id {
        validate_identifier("id", id)?;
    }
    if let Some(device_id) = &input.device_id {
        validate_identifier("device_id", device_id)?;
    }
    if let Some(country) = input.customer.as_ref().and_then(|c| c.country.as_ref()) {
        validate_country_code("customer.country", country)?;
    }

    validate_item_count(input.items.len()).map_err(|e| CoreError::InvalidItems {
        reason: e.to_string(),
    })?;

    let currency = settings.currency;
    let mut items = Vec::with_capacity(input.items.len());
    for line in input.items {
        items.push(price_line(line, settings)?);
    }

    let subtotal = items
        .iter()
        .try_fold(Money::zero(currency), |acc, item| {
            item.unit_price
                .checked_mul_quantity(item.quantity)
                .and_then(|line| acc.checked_add(line))
        })
        .ok_or_else(|| CoreError::InvalidItems {
            reason: "subtotal is too large".to_string(),
        })?;
    let tax_amount = tax_for(&items, currency);
    let gross = subtotal
        .checked_add(tax_amount)
        .ok_or_else(|| amount_out_of_range("total"))?;
    validate_non_negative("total", gross)?;

    let discount_amount = match input.discount {
        Some(discount) => {
            discount.check_currency(currency)?;
            validate_non_negative("discount", discount)?;
            if discount > gross {
                return Err(ValidationError::OutOfRange {
                    field: "discount".to_string(),
                    min: 0,
                    max: gross.minor(),
                }
                .into());
            }
            discount
        }
        None => Money::zero(currency),
    };

    let tip_amount = Money::zero(currency);
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let transaction = Transaction {
        id: id.clone(),
        event_id: input.event_id,
        staff_id: input.staff_id,
        device_id: input.device_id,
        customer: input.customer,
        items,
        subtotal,
        tax_amount,
        tip_amount,
        discount_amount,
        total_amount: gross + tip_amount - discount_amount,
        payment_method: None,
        payment_details: None,
        status: TransactionStatus::Pending,
        refund_history: Vec::new(),
        fraud_alerts: Vec::new(),
        sync_status: SyncStatus::Pending,
        void_reason: None,
        voided_by: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        version: 1,
    };

    Ok(LedgerOutcome {
        transaction,
        cash_movement: None,
        sync: Some(SyncIntent::new(id, SyncOperation::CreateTransaction)),
    })
}

/// `Pending → Processing` while the caller talks to a gateway. Local only.
pub fn begin_processing(transaction: &Transaction, now: DateTime<Utc>) -> CoreResult<Transaction> {
    if transaction.status != TransactionStatus::Pending {
        return Err(CoreError::transaction_state(
            &transaction.id,
            transaction.status,
            "begin processing",
        ));
    }

    let mut updated = transaction.clone();
    updated.status = TransactionStatus::Processing;
    updated.touch(now);
    Ok(updated)
}

/// `Processing → Pending` when the gateway interaction is abandoned. Local only.
pub fn abandon_processing(transaction: &Transaction, now: DateTime<Utc>) -> CoreResult<Transaction> {
    if transaction.status != TransactionStatus::Processing {
        return Err(CoreError::transaction_state(
            &transaction.id,
            transaction.status,
            "abandon processing",
        ));
    }

    let mut updated = transaction.clone();
    updated.status = TransactionStatus::Pending;
    updated.touch(now);
    Ok(updated)
}

/// Records payment and completes the transaction.
///
/// ## Rules
/// - Only while `Pending` or `Processing`
/// - Amount due is `subtotal + tax - discount + tip`; it becomes the new total
/// - Cash must cover the amount due; change is computed
/// - Split parts must sum exactly to the amount due
/// - Fraud rules run on the completed record and only annotate it
///
/// ## Example
/// ```text
/// total 27.00, tip 3.00, cash tendered 35.00
///   → total 30.00, change 5.00, drawer +30.00
/// ```
pub fn capture_payment(
    transaction: &Transaction,
    settings: &Settings,
    capture: CapturePayment,
    screen: &FraudScreen,
    fraud_context: &FraudContext,
    now: DateTime<Utc>,
) -> CoreResult<LedgerOutcome> {
    if !transaction.status.is_open() {
        return Err(CoreError::transaction_state(
            &transaction.id,
            transaction.status,
            "capture payment",
        ));
    }

    let currency = transaction.currency();
    let tip = capture.tip.unwrap_or_else(|| Money::zero(currency));
    tip.check_currency(currency)?;
    validate_non_negative("tip", tip)?;

    let amount_due = transaction
        .subtotal
        .checked_add(transaction.tax_amount)
        .and_then(|m| m.checked_sub(transaction.discount_amount))
        .and_then(|m| m.checked_add(tip))
        .ok_or_else(|| amount_out_of_range("tip"))?;
    let details = settle_tender(&capture.tender, amount_due, currency, false)?;

    let mut updated = transaction.clone();
    updated.tip_amount = tip;
    updated.total_amount = amount_due;
    updated.payment_method = Some(details.method());
    updated.status = TransactionStatus::Completed;
    updated.completed_at = Some(now);
    updated.sync_status = SyncStatus::Pending;
    updated.touch(now);

    let cash_in = details.cash_retained(currency);
    updated.payment_details = Some(details);

    let alerts = screen.evaluate(&updated, settings, fraud_context, now);
    updated.fraud_alerts.extend(alerts);

    let cash_movement = cash_in.is_positive().then(|| CashMovement {
        id: Uuid::new_v4().to_string(),
        session_id: None,
        transaction_id: updated.id.clone(),
        staff_id: updated.staff_id.clone(),
        kind: CashMovementKind::Sale,
        amount: cash_in,
        occurred_at: now,
    });

    let sync = Some(SyncIntent::new(updated.id.clone(), SyncOperation::CapturePayment));
    Ok(LedgerOutcome {
        transaction: updated,
        cash_movement,
        sync,
    })
}

/// Appends a refund to a completed transaction.
///
/// ## Rules
/// - Only while `Completed` (refunded, voided and unpaid records conflict)
/// - Completed refunds may not exceed `total_amount`
/// - Status becomes `Refunded` exactly when they equal it
/// - A declined refund is recorded as `Failed` and changes nothing else
/// - Replaying a request with a known `refund_id` returns the record unchanged
pub fn refund(
    transaction: &Transaction,
    request: RefundRequest,
    now: DateTime<Utc>,
) -> CoreResult<LedgerOutcome> {
    if let Some(refund_id) = &request.refund_id {
        validate_identifier("refund_id", refund_id)?;
        if transaction.refund_history.iter().any(|r| &r.id == refund_id) {
            return Ok(LedgerOutcome::unchanged(transaction));
        }
    }

    if transaction.status != TransactionStatus::Completed {
        return Err(CoreError::transaction_state(
            &transaction.id,
            transaction.status,
            "refund",
        ));
    }

    validate_identifier("staff_id", &request.staff_id)?;
    let reason = validate_text("reason", &request.reason)?;
    let currency = transaction.currency();
    request.amount.check_currency(currency)?;
    validate_positive("amount", request.amount)?;

    if request.method == PaymentMethod::Split {
        return Err(ValidationError::NotAllowed {
            field: "refund method".to_string(),
            allowed: vec!["cash".into(), "card".into(), "digital_wallet".into()],
        }
        .into());
    }

    let remaining = transaction.refundable_amount();
    if request.amount > remaining {
        return Err(CoreError::RefundExceedsTotal {
            transaction_id: transaction.id.clone(),
            requested: request.amount,
            remaining,
        });
    }

    let status = match request.outcome {
        GatewayOutcome::Approved => RefundStatus::Completed,
        GatewayOutcome::Declined => RefundStatus::Failed,
    };
    let refund_id = request
        .refund_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut updated = transaction.clone();
    updated.refund_history.push(RefundRecord {
        id: refund_id.clone(),
        amount: request.amount,
        reason,
        staff_id: request.staff_id.clone(),
        timestamp: now,
        method: request.method,
        status,
        gateway_reference: request.gateway_reference,
    });
    if updated.refunded_amount() == updated.total_amount {
        updated.status = TransactionStatus::Refunded;
    }
    updated.sync_status = SyncStatus::Pending;
    updated.touch(now);

    let cash_movement = (status == RefundStatus::Completed
        && request.method == PaymentMethod::Cash)
        .then(|| CashMovement {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            transaction_id: updated.id.clone(),
            staff_id: request.staff_id,
            kind: CashMovementKind::Refund,
            amount: -request.amount,
            occurred_at: now,
        });

    let sync = Some(SyncIntent::new(
        updated.id.clone(),
        SyncOperation::Refund { refund_id },
    ));
    Ok(LedgerOutcome {
        transaction: updated,
        cash_movement,
        sync,
    })
}

/// Cancels an unpaid transaction. No money moves.
pub fn void_transaction(
    transaction: &Transaction,
    request: VoidRequest,
    now: DateTime<Utc>,
) -> CoreResult<LedgerOutcome> {
    if !transaction.status.is_open() {
        return Err(CoreError::transaction_state(
            &transaction.id,
            transaction.status,
            "void",
        ));
    }

    validate_identifier("staff_id", &request.staff_id)?;
    let reason = validate_text("reason", &request.reason)?;

    let mut updated = transaction.clone();
    updated.status = TransactionStatus::Voided;
    updated.void_reason = Some(reason);
    updated.voided_by = Some(request.staff_id);
    updated.sync_status = SyncStatus::Pending;
    updated.touch(now);

    let sync = Some(SyncIntent::new(updated.id.clone(), SyncOperation::VoidTransaction));
    Ok(LedgerOutcome {
        transaction: updated,
        cash_movement: None,
        sync,
    })
}

// =============================================================================
// Helpers
// =============================================================================


fn price_line(line: LineItemInput, settings: &Settings) -> CoreResult<PaymentItem> {
    validate_quantity(line.quantity).map_err(|e| CoreError::InvalidItems {
        reason: format!("item {}: {}", line.id, e),
    })?;
    validate_identifier("item id", &line.id)?;
    let name = validate_text("item name", &line.name)?;
    line.unit_price.check_currency(settings.currency)?;
    validate_non_negative("unit_price", line.unit_price)?;

    let tax_rate = match line.tax_rate_bps {
        Some(bps) => {
            validate_tax_rate_bps(bps)?;
            TaxRate::from_bps(bps)
        }
        None => settings.tax_rate(),
    };

    Ok(PaymentItem {
        id: line.id,
        name,
        quantity: line.quantity,
        unit_price: line.unit_price,
        tax_rate,
        category: line.category,
    })
}

fn amount_out_of_range(field: &str) -> CoreError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_AMOUNT_MINOR,
    }
    .into()
}

/// Tax per rate group, each group rounded once.
fn tax_for(items: &[PaymentItem], currency: CurrencyCode) -> Money {
    let mut groups: BTreeMap<TaxRate, Money> = BTreeMap::new();
    for item in items {
        *groups.entry(item.tax_rate).or_insert_with(|| Money::zero(currency)) += item.total_price();
    }

    groups
        .into_iter()
        .fold(Money::zero(currency), |acc, (rate, base)| {
            acc + base.apply_bps(rate.bps())
        })
}

/// Turns a tender into recorded payment details for `amount`.
fn settle_tender(
    tender: &Tender,
    amount: Money,
    currency: CurrencyCode,
    within_split: bool,
) -> CoreResult<PaymentDetails> {
    match tender {
        Tender::Cash { amount_tendered } => {
            amount_tendered.check_currency(currency)?;
            validate_non_negative("amount_tendered", *amount_tendered)?;
            if *amount_tendered < amount {
                return Err(CoreError::InsufficientPayment {
                    due: amount,
                    tendered: *amount_tendered,
                });
            }
            Ok(PaymentDetails::Cash {
                amount_tendered: *amount_tendered,
                change_given: *amount_tendered - amount,
            })
        }
        Tender::Card {
            card_brand,
            last4,
            auth_code,
        } => {
            validate_card_last4(last4)?;
            validate_auth_code(auth_code)?;
            Ok(PaymentDetails::Card {
                card_brand: card_brand
                    .as_ref()
                    .map(|b| b.trim().to_string())
                    .filter(|b| !b.is_empty()),
                last4: last4.clone(),
                auth_code: auth_code.trim().to_string(),
            })
        }
        Tender::DigitalWallet { wallet, auth_code } => {
            let wallet = validate_text("wallet", wallet)?;
            validate_auth_code(auth_code)?;
            Ok(PaymentDetails::DigitalWallet {
                wallet,
                auth_code: auth_code.trim().to_string(),
            })
        }
        Tender::Split { parts } => {
            if within_split {
                return Err(ValidationError::NotAllowed {
                    field: "split part".to_string(),
                    allowed: vec!["cash".into(), "card".into(), "digital_wallet".into()],
                }
                .into());
            }
            if parts.len() < 2 || parts.len() > MAX_SPLIT_PARTS {
                return Err(ValidationError::OutOfRange {
                    field: "split parts".to_string(),
                    min: 2,
                    max: MAX_SPLIT_PARTS as i64,
                }
                .into());
            }

            let mut sum = Money::zero(currency);
            for part in parts {
                part.amount.check_currency(currency)?;
                validate_positive("split part amount", part.amount)?;
                sum += part.amount;
            }
            if sum != amount {
                return Err(ValidationError::InvalidFormat {
                    field: "split parts".to_string(),
                    reason: format!("parts sum to {} but {} is due", sum, amount),
                }
                .into());
            }

            let settled = parts
                .iter()
                .map(|part| {
                    settle_tender(&part.tender, part.amount, currency, true).map(|details| {
                        SplitPayment {
                            amount: part.amount,
                            details,
                        }
                    })
                })
                .collect::<CoreResult<Vec<_>>>()?;

            Ok(PaymentDetails::Split { parts: settled })
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    /// (unit price, quantity, tax override)
    fn line_strategy() -> impl Strategy<Value = (i64, i64, Option<u32>)> {
        (0i64..=50_000, 1i64..=20, prop::option::of(0u32..=2_500))
    }

    /// (use the exact remaining amount, requested amount, gateway approves)
    fn refund_strategy() -> impl Strategy<Value = (bool, i64, bool)> {
        (any::<bool>(), 1i64..=250_000, any::<bool>())
    }

    fn new_txn(lines: &[(i64, i64, Option<u32>)], discount: Option<Money>) -> NewTransaction {
        NewTransaction {
            id: None,
            event_id: "evt-1".into(),
            staff_id: "staff-1".into(),
            device_id: None,
            customer: None,
            items: lines
                .iter()
                .enumerate()
                .map(|(i, &(unit, quantity, tax_rate_bps))| LineItemInput {
                    id: format!("line-{}", i),
                    name: format!("Ticket {}", i),
                    quantity,
                    unit_price: Money::new(unit, CurrencyCode::USD),
                    tax_rate_bps,
                    category: None,
                })
                .collect(),
            discount,
        }
    }

    proptest! {
        #[test]
        fn totals_and_refund_bound_hold_at_every_step(
            lines in prop::collection::vec(line_strategy(), 1..8),
            discount_pct in 0i64..=100,
            tip in 0i64..=20_000,
            refunds in prop::collection::vec(refund_strategy(), 0..12),
        ) {
            let settings = Settings::default();
            let now = Utc::now();

            let undiscounted = create_transaction(&settings, new_txn(&lines, None), now)
                .unwrap()
                .transaction;
            let gross = undiscounted.subtotal + undiscounted.tax_amount;
            let discount = Money::new(gross.minor() * discount_pct / 100, CurrencyCode::USD);

            let created = create_transaction(&settings, new_txn(&lines, Some(discount)), now)
                .unwrap()
                .transaction;
            let expected_subtotal: i64 = lines.iter().map(|&(unit, qty, _)| unit * qty).sum();
            prop_assert_eq!(created.subtotal.minor(), expected_subtotal);
            prop_assert_eq!(created.discount_amount, discount);
            prop_assert!(created.totals_balance());

            let mut txn = capture_payment(
                &created,
                &settings,
                CapturePayment {
                    tender: Tender::Card {
                        card_brand: None,
                        last4: "4242".into(),
                        auth_code: "AUTH1".into(),
                    },
                    tip: Some(Money::new(tip, CurrencyCode::USD)),
                },
                &FraudScreen::empty(),
                &FraudContext::default(),
                now,
            )
            .unwrap()
            .transaction;
            prop_assert_eq!(txn.total_amount, gross - discount + Money::new(tip, CurrencyCode::USD));
            prop_assert!(txn.totals_balance());

            for (exact, requested, approved) in refunds {
                let amount = if exact { txn.refundable_amount() } else { Money::new(requested, CurrencyCode::USD) };
                let request = RefundRequest {
                    refund_id: None,
                    amount,
                    reason: "customer request".into(),
                    staff_id: "staff-2".into(),
                    method: PaymentMethod::Card,
                    outcome: if approved { GatewayOutcome::Approved } else { GatewayOutcome::Declined },
                    gateway_reference: None,
                };
                let before = txn.refunded_amount();

                match refund(&txn, request, now) {
                    Ok(outcome) => {
                        prop_assert_eq!(txn.status, TransactionStatus::Completed);
                        prop_assert!(amount <= txn.refundable_amount());
                        let after = outcome.transaction.refunded_amount();
                        if approved {
                            prop_assert_eq!(after, before + amount);
                        } else {
                            prop_assert_eq!(after, before);
                            prop_assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
                        }
                        txn = outcome.transaction;
                    }
                    Err(CoreError::RefundExceedsTotal { .. }) => {
                        prop_assert!(amount > txn.refundable_amount());
                    }
                    Err(CoreError::InvalidState { .. }) => {
                        prop_assert_eq!(txn.status, TransactionStatus::Refunded);
                    }
                    Err(CoreError::Validation(_)) => {
                        prop_assert!(!amount.is_positive());
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }

                prop_assert!(txn.totals_balance());
                prop_assert!(txn.refunded_amount() <= txn.total_amount);
                prop_assert!(!txn.refundable_amount().is_negative());
            }
        }
    }
}
