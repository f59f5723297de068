//! # Cash Drawer
//!
//! Expected-vs-counted balance for one staff member's cash shift.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (no session) ──open──► Open ──begin_count──► Reconciling               │
//! │                           │                        │                    │
//! │                           └────────close───────────┴──► Closed          │
//! │                                                                         │
//! │  Open / Reconciling:  cash sale    → expected += amount                 │
//! │                       cash refund  → expected -= amount                 │
//! │  Closed:              current = Σ counts, variance = current - expected │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions are explicit values passed in and returned. There is no
//! "current session" global: the caller looks one up per staff member.
//! A close out of balance succeeds; the variance is reported, not enforced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{CurrencyCode, Money};
use crate::settings::Settings;
use crate::sync::{SyncIntent, SyncOperation};
use crate::types::{
    BalanceStatus, CashCount, CashDrawerSession, CashMovement, DrawerCloseSummary, DrawerStatus,
};
use crate::validation::{validate_identifier, validate_non_negative, validate_positive, validate_text};
use crate::MAX_CASH_COUNT;

// =============================================================================
// Inputs & Outcome
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenDrawer {
    #[serde(default)]
    pub session_id: Option<String>,
    pub staff_id: String,
    pub event_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    pub opening_balance: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseDrawer {
    pub counts: Vec<CashCount>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A drawer mutation ready to commit.
#[derive(Debug, Clone)]
pub struct DrawerOutcome {
    pub session: CashDrawerSession,
    pub sync: Option<SyncIntent>,
}

// =============================================================================
// Operations
// =============================================================================

/// Opens a session for a staff member.
///
/// `active` is the staff member's current open or reconciling session, if any.
///
/// ## Errors
/// - `DrawerAlreadyOpen` when `active` is present
/// - `CurrencyMismatch` / `Validation` for a bad opening balance
pub fn open_session(
    settings: &Settings,
    input: OpenDrawer,
    active: Option<&CashDrawerSession>,
    now: DateTime<Utc>,
) -> CoreResult<DrawerOutcome> {
    validate_identifier("staff_id", &input.staff_id)?;
    validate_identifier("event_id", &input.event_id)?;
    if let Some(id) = &input.session_id {
        validate_identifier("session_id", id)?;
    }

    if let Some(existing) = active.filter(|s| s.status.is_active()) {
        return Err(CoreError::DrawerAlreadyOpen {
            staff_id: input.staff_id,
            session_id: existing.id.clone(),
        });
    }

    input.opening_balance.check_currency(settings.currency)?;
    validate_non_negative("opening_balance", input.opening_balance)?;

    let id = input
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = CashDrawerSession {
        id: id.clone(),
        staff_id: input.staff_id,
        event_id: input.event_id,
        device_id: input.device_id,
        opening_balance: input.opening_balance,
        expected_balance: input.opening_balance,
        current_balance: None,
        status: DrawerStatus::Open,
        cash_counts: Vec::new(),
        notes: None,
        opened_at: now,
        closed_at: None,
        updated_at: now,
        version: 1,
    };

    Ok(DrawerOutcome {
        session,
        sync: Some(SyncIntent::new(id, SyncOperation::OpenDrawer)),
    })
}

/// Applies a cash sale or refund to the running expected balance.
pub fn apply_cash_movement(
    session: &CashDrawerSession,
    movement: &CashMovement,
    now: DateTime<Utc>,
) -> CoreResult<CashDrawerSession> {
    if !session.status.is_active() {
        return Err(CoreError::NoOpenSession(session.id.clone()));
    }
    movement.amount.check_currency(session.expected_balance.currency())?;

    let mut updated = session.clone();
    updated.expected_balance += movement.amount;
    updated.touch(now);
    Ok(updated)
}

/// `Open → Reconciling`: staff starts counting. Local only.
pub fn begin_count(session: &CashDrawerSession, now: DateTime<Utc>) -> CoreResult<CashDrawerSession> {
    match session.status {
        DrawerStatus::Open => {
            let mut updated = session.clone();
            updated.status = DrawerStatus::Reconciling;
            updated.touch(now);
            Ok(updated)
        }
        DrawerStatus::Reconciling => Err(CoreError::session_state(
            &session.id,
            session.status,
            "begin count",
        )),
        DrawerStatus::Closed => Err(CoreError::NoOpenSession(session.id.clone())),
    }
}

/// Closes a session from a physical count.
///
/// `current_balance = Σ count.value`. The variance never blocks the close.
pub fn close_session(
    session: &CashDrawerSession,
    input: CloseDrawer,
    now: DateTime<Utc>,
) -> CoreResult<DrawerOutcome> {
    if !session.status.is_active() {
        return Err(CoreError::NoOpenSession(session.id.clone()));
    }

    let counted = validate_cash_counts(&input.counts, session.expected_balance.currency())?;
    let notes = match input.notes.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => Some(validate_text("notes", n)?),
        _ => None,
    };

    let mut updated = session.clone();
    updated.current_balance = Some(counted);
    updated.cash_counts = input.counts;
    updated.notes = notes;
    updated.status = DrawerStatus::Closed;
    updated.closed_at = Some(now);
    updated.touch(now);

    let sync = Some(SyncIntent::new(updated.id.clone(), SyncOperation::CloseDrawer));
    Ok(DrawerOutcome {
        session: updated,
        sync,
    })
}

/// Checks a physical count and returns its total.
///
/// ## Rules
/// - At least one line
/// - Denomination positive and within [`crate::MAX_AMOUNT_MINOR`]
/// - Count between zero and [`MAX_CASH_COUNT`]
/// - `value == denomination × count`
/// - Every amount in the session currency
pub fn validate_cash_counts(counts: &[CashCount], currency: CurrencyCode) -> CoreResult<Money> {
    if counts.is_empty() {
        return Err(ValidationError::Required {
            field: "cash counts".to_string(),
        }
        .into());
    }

    let mut total = Money::zero(currency);
    for count in counts {
        count.denomination.check_currency(currency)?;
        count.value.check_currency(currency)?;

        validate_positive("denomination", count.denomination)?;
        if !(0..=MAX_CASH_COUNT).contains(&count.count) {
            return Err(ValidationError::OutOfRange {
                field: "count".to_string(),
                min: 0,
                max: MAX_CASH_COUNT,
            }
            .into());
        }
        if count.denomination.checked_mul_quantity(count.count) != Some(count.value) {
            return Err(ValidationError::InvalidFormat {
                field: "value".to_string(),
                reason: format!(
                    "{} × {} is not {}",
                    count.denomination, count.count, count.value
                ),
            }
            .into());
        }
        total = total
            .checked_add(count.value)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "cash counts".to_string(),
                min: 0,
                max: i64::MAX,
            })?;
    }

    Ok(total)
}

impl DrawerCloseSummary {
    /// Builds the close report for a counted session.
    pub fn from_session(session: &CashDrawerSession) -> Option<Self> {
        let counted = session.current_balance?;
        let variance = counted - session.expected_balance;
        let balance = if variance.is_zero() {
            BalanceStatus::Balanced
        } else if variance.is_positive() {
            BalanceStatus::Over
        } else {
            BalanceStatus::Short
        };

        Some(DrawerCloseSummary {
            session: session.clone(),
            expected: session.expected_balance,
            counted,
            variance,
            balance,
        })
    }
}


// =============================================================================
// Unit Tests
// =============================================================================
