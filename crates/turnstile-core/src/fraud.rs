//! # Fraud Screen
//!
//! Pure, advisory checks run when a payment is captured.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  capture_payment                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  FraudScreen::evaluate(txn, settings, context)                          │
//! │       │                                                                 │
//! │       ├── AmountThresholdRule   → suspicious_amount  (medium)           │
//! │       ├── VelocityRule          → high_velocity      (medium)           │
//! │       └── LocationMismatchRule  → location_mismatch  (low)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  alerts appended to txn.fraud_alerts; the capture always proceeds       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Alerts are for later human review. Nothing here blocks a sale and
//! dismissed alerts do not feed back into scoring.

use chrono::{DateTime, Utc};

use crate::settings::Settings;
use crate::types::{FraudAlert, FraudAlertKind, FraudSeverity, Transaction};

/// Facts gathered by the caller (usually from the store) before screening.
#[derive(Debug, Clone, Default)]
pub struct FraudContext {
    /// Captures for the same customer within the velocity window, excluding
    /// the one being screened.
    pub recent_customer_captures: u32,
}

/// One independent check. Returns zero or more alerts, never an error.
pub trait FraudRule: Send + Sync {
    fn evaluate(
        &self,
        transaction: &Transaction,
        settings: &Settings,
        context: &FraudContext,
        now: DateTime<Utc>,
    ) -> Vec<FraudAlert>;
}

/// Flags captures whose total exceeds the configured threshold.
pub struct AmountThresholdRule;

impl FraudRule for AmountThresholdRule {
    fn evaluate(
        &self,
        transaction: &Transaction,
        settings: &Settings,
        _context: &FraudContext,
        now: DateTime<Utc>,
    ) -> Vec<FraudAlert> {
        let threshold = settings.fraud_threshold();
        if transaction.total_amount > threshold {
            vec![FraudAlert {
                kind: FraudAlertKind::SuspiciousAmount,
                severity: FraudSeverity::Medium,
                message: format!(
                    "Total {} exceeds threshold {}",
                    transaction.total_amount, threshold
                ),
                detected_at: now,
            }]
        } else {
            Vec::new()
        }
    }
}

/// Flags a customer who has already paid `velocity_limit` times within the window.
pub struct VelocityRule;

impl FraudRule for VelocityRule {
    fn evaluate(
        &self,
        transaction: &Transaction,
        settings: &Settings,
        context: &FraudContext,
        now: DateTime<Utc>,
    ) -> Vec<FraudAlert> {
        let has_customer = transaction
            .customer
            .as_ref()
            .and_then(|c| c.key())
            .is_some();

        if settings.velocity_limit == 0
            || !has_customer
            || context.recent_customer_captures < settings.velocity_limit
        {
            return Vec::new();
        }

        vec![FraudAlert {
            kind: FraudAlertKind::HighVelocity,
            severity: FraudSeverity::Medium,
            message: format!(
                "Customer has {} captures in the last {}s",
                context.recent_customer_captures, settings.velocity_window_secs
            ),
            detected_at: now,
        }]
    }
}

/// Flags a customer whose billing country differs from the venue's.
pub struct LocationMismatchRule;

impl FraudRule for LocationMismatchRule {
    fn evaluate(
        &self,
        transaction: &Transaction,
        settings: &Settings,
        _context: &FraudContext,
        now: DateTime<Utc>,
    ) -> Vec<FraudAlert> {
        let customer_country = transaction.customer.as_ref().and_then(|c| c.country.as_deref());

        match (customer_country, settings.venue_country.as_deref()) {
            (Some(customer), Some(venue)) if !customer.trim().eq_ignore_ascii_case(venue.trim()) => {
                vec![FraudAlert {
                    kind: FraudAlertKind::LocationMismatch,
                    severity: FraudSeverity::Low,
                    message: format!(
                        "Customer country {} differs from venue country {}",
                        customer.trim().to_ascii_uppercase(),
                        venue.trim().to_ascii_uppercase()
                    ),
                    detected_at: now,
                }]
            }
            _ => Vec::new(),
        }
    }
}

// =============================================================================
// Screen
// =============================================================================

/// An ordered, extensible set of rules.
pub struct FraudScreen {
    rules: Vec<Box<dyn FraudRule>>,
}

impl FraudScreen {
    /// A screen with no rules.
    pub fn empty() -> Self {
        FraudScreen { rules: Vec::new() }
    }

    /// Amount threshold, velocity and location mismatch.
    pub fn standard() -> Self {
        FraudScreen::empty()
            .with_rule(AmountThresholdRule)
            .with_rule(VelocityRule)
            .with_rule(LocationMismatchRule)
    }

    pub fn with_rule(mut self, rule: impl FraudRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Runs every rule and concatenates the alerts.
    pub fn evaluate(
        &self,
        transaction: &Transaction,
        settings: &Settings,
        context: &FraudContext,
        now: DateTime<Utc>,
    ) -> Vec<FraudAlert> {
        self.rules
            .iter()
            .flat_map(|rule| rule.evaluate(transaction, settings, context, now))
            .collect()
    }
}

impl Default for FraudScreen {
    fn default() -> Self {
        FraudScreen::standard()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{create_transaction, LineItemInput, NewTransaction};
    use crate::money::{CurrencyCode, Money};
    use crate::types::Customer;

    fn txn(unit_minor: i64, customer: Option<Customer>) -> Transaction {
        let settings = Settings {
            tax_rate_bps: 0,
            ..Settings::default()
        };
        create_transaction(
            &settings,
            NewTransaction {
                id: None,
                event_id: "evt-1".into(),
                staff_id: "staff-1".into(),
                device_id: None,
                customer,
                items: vec![LineItemInput {
                    id: "ga".into(),
                    name: "General Admission".into(),
                    quantity: 1,
                    unit_price: Money::new(unit_minor, CurrencyCode::USD),
                    tax_rate_bps: None,
                    category: None,
                }],
                discount: None,
            },
            Utc::now(),
        )
        .unwrap()
        .transaction
    }

    #[test]
    fn test_amount_threshold() {
        let settings = Settings::default(); // threshold $500.00
        let screen = FraudScreen::standard();
        let ctx = FraudContext::default();

        assert!(screen.evaluate(&txn(50_000, None), &settings, &ctx, Utc::now()).is_empty());

        let alerts = screen.evaluate(&txn(50_001, None), &settings, &ctx, Utc::now());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, FraudAlertKind::SuspiciousAmount);
        assert_eq!(alerts[0].severity, FraudSeverity::Medium);
    }

    #[test]
    fn test_velocity_requires_customer_and_limit() {
        let settings = Settings {
            velocity_limit: 3,
            ..Settings::default()
        };
        let busy = FraudContext {
            recent_customer_captures: 3,
        };
        let customer = Customer {
            email: Some("fan@example.com".into()),
            ..Customer::default()
        };

        let anonymous = VelocityRule.evaluate(&txn(100, None), &settings, &busy, Utc::now());
        assert!(anonymous.is_empty());

        let known = VelocityRule.evaluate(&txn(100, Some(customer.clone())), &settings, &busy, Utc::now());
        assert_eq!(known[0].kind, FraudAlertKind::HighVelocity);

        let quiet = FraudContext {
            recent_customer_captures: 2,
        };
        assert!(VelocityRule
            .evaluate(&txn(100, Some(customer)), &settings, &quiet, Utc::now())
            .is_empty());
    }

    #[test]
    fn test_location_mismatch_is_low() {
        let settings = Settings {
            venue_country: Some("US".into()),
            ..Settings::default()
        };
        let foreign = Customer {
            country: Some("gb".into()),
            ..Customer::default()
        };
        let local = Customer {
            country: Some("us".into()),
            ..Customer::default()
        };
        let ctx = FraudContext::default();

        let alerts = LocationMismatchRule.evaluate(&txn(100, Some(foreign)), &settings, &ctx, Utc::now());
        assert_eq!(alerts[0].severity, FraudSeverity::Low);

        assert!(LocationMismatchRule
            .evaluate(&txn(100, Some(local)), &settings, &ctx, Utc::now())
            .is_empty());
    }

    #[test]
    fn test_empty_screen_never_alerts() {
        let alerts = FraudScreen::empty().evaluate(
            &txn(10_000_000, None),
            &Settings::default(),
            &FraudContext::default(),
            Utc::now(),
        );
        assert!(alerts.is_empty());
    }
}
