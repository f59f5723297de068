//! # Domain Types
//!
//! Core domain types used throughout Turnstile.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  Transaction    │   │  RefundRecord   │   │ CashDrawerSession│      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  amount         │   │  id             │       │
//! │  │  items[]        │   │  method         │   │  opening_balance│       │
//! │  │  totals (Money) │   │  status         │   │  expected_bal.  │       │
//! │  │  status         │   └─────────────────┘   │  cash_counts[]  │       │
//! │  │  refund_history │                         └────────▲────────┘       │
//! │  │  fraud_alerts   │   ┌─────────────────┐            │                │
//! │  │  sync_status    │──►│  CashMovement   │────────────┘                │
//! │  └─────────────────┘   │  +sale / -refund│                              │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Two Status Fields
//! A transaction carries both a business `status` (the ledger state machine)
//! and a `sync_status` (has the remote ledger seen the latest mutation?).
//! They move independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{CurrencyCode, Money};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Items & Customer
// =============================================================================

/// A priced line on a transaction.
///
/// Uses the snapshot pattern: unit price and tax rate are frozen when the
/// transaction is created and never follow later catalog or settings changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentItem {
    /// Catalog item id.
    pub id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Tax rate applied to this line (frozen).
    pub tax_rate: TaxRate,
    pub category: Option<String>,
}

impl PaymentItem {
    /// `unit_price × quantity`; computed, never stored.
    #[inline]
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// Buyer details as given by the caller. All optional: walk-up sales are anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    /// ISO 3166 alpha-2 country of the buyer's billing address.
    pub country: Option<String>,
}

impl Customer {
    /// Stable key used to group a customer's transactions (velocity checks).
    ///
    /// Prefers the customer id, falls back to the lowercased email.
    pub fn key(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.email
                    .as_ref()
                    .map(|email| email.trim().to_ascii_lowercase())
                    .filter(|email| !email.is_empty())
            })
    }
}

// =============================================================================
// Status Enums
// =============================================================================

/// The business state of a transaction.
///
/// ```text
///            begin_processing
///   Pending ◄──────────────────► Processing
///      │    abandon_processing       │
///      │                             │
///      ├──── capture_payment ◄───────┤
///      │            │                │
///      ▼            ▼                ▼
///   Voided      Completed ──refund──► Refunded (when fully refunded)
///  (terminal)       │                (terminal)
///                   └── partial refund stays Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    /// Transient: the caller is talking to a payment gateway.
    Processing,
    Completed,
    Refunded,
    Voided,
}

impl TransactionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Voided => "voided",
        }
    }

    /// Pending and processing both allow capture and void.
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }

    /// No transition leaves refunded or voided.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Refunded | TransactionStatus::Voided)
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Pending
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the remote ledger has accepted the transaction's latest mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    /// A queue entry exceeded the retry ceiling and needs manual resolution.
    Failed,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Pending
    }
}

// =============================================================================
// Payment Method & Details
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash into the drawer.
    Cash,
    /// Card on an external terminal; only the outcome is recorded.
    Card,
    /// Apple Pay, Google Pay and similar.
    DigitalWallet,
    /// Two or more of the above.
    Split,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::DigitalWallet => "digital_wallet",
            PaymentMethod::Split => "split",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recorded outcome of a capture, specific to the method used.
///
/// Card data is limited to the masked suffix and the authorization code;
/// full card numbers never enter the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDetails {
    Cash {
        amount_tendered: Money,
        change_given: Money,
    },
    Card {
        card_brand: Option<String>,
        last4: String,
        auth_code: String,
    },
    DigitalWallet {
        wallet: String,
        auth_code: String,
    },
    Split {
        parts: Vec<SplitPayment>,
    },
}

/// One tender of a split payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SplitPayment {
    /// Portion of the amount due settled by this part.
    pub amount: Money,
    pub details: PaymentDetails,
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentDetails::Cash { .. } => PaymentMethod::Cash,
            PaymentDetails::Card { .. } => PaymentMethod::Card,
            PaymentDetails::DigitalWallet { .. } => PaymentMethod::DigitalWallet,
            PaymentDetails::Split { .. } => PaymentMethod::Split,
        }
    }

    /// Cash kept in the drawer (tendered minus change), across split parts.
    pub fn cash_retained(&self, currency: CurrencyCode) -> Money {
        match self {
            PaymentDetails::Cash {
                amount_tendered,
                change_given,
            } => *amount_tendered - *change_given,
            PaymentDetails::Split { parts } => parts
                .iter()
                .filter(|part| matches!(part.details, PaymentDetails::Cash { .. }))
                .fold(Money::zero(currency), |acc, part| acc + part.amount),
            _ => Money::zero(currency),
        }
    }
}

// =============================================================================
// Refunds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Money returned; counts toward the refunded sum.
    Completed,
    /// Gateway declined; kept for audit only.
    Failed,
}

/// One refund request against a transaction. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRecord {
    pub id: String,
    pub amount: Money,
    pub reason: String,
    pub staff_id: String,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub method: PaymentMethod,
    pub status: RefundStatus,
    /// Gateway reference or decline reason, as reported by the caller.
    pub gateway_reference: Option<String>,
}

// =============================================================================
// Fraud Alerts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FraudSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FraudAlertKind {
    SuspiciousAmount,
    HighVelocity,
    LocationMismatch,
}

/// Advisory signal attached at capture time. Never blocks the transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FraudAlert {
    pub kind: FraudAlertKind,
    pub severity: FraudSeverity,
    pub message: String,
    #[ts(as = "String")]
    pub detected_at: DateTime<Utc>,
}

// =============================================================================
// Transaction
// =============================================================================

/// A sale record. Created pending, mutated only by ledger operations,
/// never deleted.
///
/// ## Invariants
/// - `total_amount == subtotal + tax_amount + tip_amount - discount_amount`
/// - completed refunds never sum past `total_amount`
/// - `status == Refunded` iff completed refunds equal `total_amount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub event_id: String,
    pub staff_id: String,
    pub device_id: Option<String>,
    pub customer: Option<Customer>,
    pub items: Vec<PaymentItem>,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub tip_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub payment_method: Option<PaymentMethod>,
    pub payment_details: Option<PaymentDetails>,
    pub status: TransactionStatus,
    pub refund_history: Vec<RefundRecord>,
    pub fraud_alerts: Vec<FraudAlert>,
    pub sync_status: SyncStatus,
    pub void_reason: Option<String>,
    pub voided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped on every mutation; used for optimistic concurrency.
    pub version: i64,
}

impl Transaction {
    #[inline]
    pub fn currency(&self) -> CurrencyCode {
        self.total_amount.currency()
    }

    /// Sum of completed refunds.
    pub fn refunded_amount(&self) -> Money {
        self.refund_history
            .iter()
            .filter(|r| r.status == RefundStatus::Completed)
            .fold(Money::zero(self.currency()), |acc, r| acc + r.amount)
    }

    /// What can still be refunded.
    #[inline]
    pub fn refundable_amount(&self) -> Money {
        self.total_amount - self.refunded_amount()
    }

    /// Checks the monetary invariants. Used by tests and after rehydration.
    pub fn totals_balance(&self) -> bool {
        let expected = self.subtotal + self.tax_amount + self.tip_amount - self.discount_amount;
        let refunded = self.refunded_amount();
        let fully_refunded = !refunded.is_zero() && refunded == self.total_amount;
        let status_matches = match self.status {
            TransactionStatus::Refunded => fully_refunded,
            _ => !fully_refunded,
        };
        expected == self.total_amount && refunded <= self.total_amount && status_matches
    }

    /// Marks a mutation: bumps version and `updated_at`.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

// =============================================================================
// Cash Drawer
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DrawerStatus {
    Open,
    /// Staff is counting the drawer; cash events still apply.
    Reconciling,
    Closed,
}

impl DrawerStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DrawerStatus::Open => "open",
            DrawerStatus::Reconciling => "reconciling",
            DrawerStatus::Closed => "closed",
        }
    }

    /// Open and reconciling sessions accept cash events.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, DrawerStatus::Open | DrawerStatus::Reconciling)
    }
}

impl fmt::Display for DrawerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical tally of one denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashCount {
    /// Face value of one note or coin.
    pub denomination: Money,
    pub count: i64,
    /// `denomination × count`.
    pub value: Money,
}

impl CashCount {
    /// Builds a count with the value computed.
    pub fn new(denomination: Money, count: i64) -> Self {
        CashCount {
            denomination,
            count,
            value: denomination.multiply_quantity(count),
        }
    }
}

/// A cash shift for one staff member.
///
/// `expected_balance` is a running total fed only by cash movements;
/// `current_balance` is set once, from the physical count at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashDrawerSession {
    pub id: String,
    pub staff_id: String,
    pub event_id: String,
    pub device_id: Option<String>,
    pub opening_balance: Money,
    pub expected_balance: Money,
    pub current_balance: Option<Money>,
    pub status: DrawerStatus,
    pub cash_counts: Vec<CashCount>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl CashDrawerSession {
    /// `current_balance - expected_balance`, once counted.
    pub fn variance(&self) -> Option<Money> {
        self.current_balance.map(|counted| counted - self.expected_balance)
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    Sale,
    Refund,
}

/// A cash-increasing or cash-decreasing event emitted by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    /// Drawer session credited; `None` when the staff member had no open drawer.
    pub session_id: Option<String>,
    pub transaction_id: String,
    pub staff_id: String,
    pub kind: CashMovementKind,
    /// Signed: positive for sales, negative for refunds.
    pub amount: Money,
    #[ts(as = "String")]
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    Balanced,
    Over,
    Short,
}

/// Returned by a drawer close: the variance is reported, never enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DrawerCloseSummary {
    pub session: CashDrawerSession,
    pub expected: Money,
    pub counted: Money,
    pub variance: Money,
    pub balance: BalanceStatus,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_status_predicates() {
        assert!(TransactionStatus::Processing.is_open());
        assert!(!TransactionStatus::Completed.is_open());
        assert!(TransactionStatus::Voided.is_terminal());
        assert!(!TransactionStatus::Completed.is_terminal());
        assert!(DrawerStatus::Reconciling.is_active());
        assert!(!DrawerStatus::Closed.is_active());
    }

    #[test]
    fn test_customer_key_prefers_id_then_email() {
        let with_id = Customer {
            id: Some("cust-1".into()),
            email: Some("A@B.com".into()),
            ..Customer::default()
        };
        assert_eq!(with_id.key().as_deref(), Some("cust-1"));

        let email_only = Customer {
            email: Some(" A@B.com ".into()),
            ..Customer::default()
        };
        assert_eq!(email_only.key().as_deref(), Some("a@b.com"));

        assert_eq!(Customer::default().key(), None);
    }

    #[test]
    fn test_payment_details_tagged_shape() {
        let details = PaymentDetails::Card {
            card_brand: Some("visa".into()),
            last4: "4242".into(),
            auth_code: "A1B2".into(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["method"], "card");
        assert_eq!(json["last4"], "4242");
    }

    #[test]
    fn test_cash_retained_in_split() {
        let usd = |m| Money::new(m, CurrencyCode::USD);
        let details = PaymentDetails::Split {
            parts: vec![
                SplitPayment {
                    amount: usd(1000),
                    details: PaymentDetails::Cash {
                        amount_tendered: usd(2000),
                        change_given: usd(1000),
                    },
                },
                SplitPayment {
                    amount: usd(2000),
                    details: PaymentDetails::Card {
                        card_brand: None,
                        last4: "1111".into(),
                        auth_code: "OK".into(),
                    },
                },
            ],
        };
        assert_eq!(details.cash_retained(CurrencyCode::USD), usd(1000));
    }

    #[test]
    fn test_cash_count_value() {
        let count = CashCount::new(Money::new(2000, CurrencyCode::USD), 3);
        assert_eq!(count.value.minor(), 6000);
    }
}
