//! # Validation Module
//!
//! Input validation utilities for Turnstile.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI / kiosk                                                    │
//! │  └── Immediate feedback (empty fields, obvious typos)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Terminal command (Rust)                                       │
//! │  ├── Type validation (deserialization)                                  │
//! │  └── THIS MODULE: field rules, run before any ledger rule               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / CHECK constraints                                       │
//! │  └── UNIQUE indexes (one open drawer per staff, idempotency keys)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use turnstile_core::validation::{validate_card_last4, validate_quantity};
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_card_last4("4242").is_ok());
//! assert!(validate_card_last4("4242424242424242").is_err());
//! ```

use crate::error::ValidationError;
use crate::money::{Money, BPS_DENOMINATOR};
use crate::{MAX_AMOUNT_MINOR, MAX_ITEMS_PER_TRANSACTION, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted identifier (ids are UUIDs or short external keys).
const MAX_ID_LEN: usize = 64;

/// Longest accepted free-text field (reasons, notes, names).
const MAX_TEXT_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier (event id, staff id, caller-supplied transaction id).
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - No whitespace (ids end up in idempotency keys)
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates required free text (item names, refund and void reasons).
///
/// ## Returns
/// The trimmed text.
pub fn validate_text(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }

    Ok(value.to_string())
}

/// Validates an ISO 3166 alpha-2 country code.
pub fn validate_country_code(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a two-letter country code".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Payment Detail Validators
// =============================================================================

/// Validates the masked card suffix.
///
/// ## Rules
/// - Exactly four ASCII digits
/// - Anything longer is treated as a full card number and rejected
///
/// ## Example
/// ```rust
/// use turnstile_core::validation::validate_card_last4;
///
/// assert!(validate_card_last4("0005").is_ok());
/// assert!(validate_card_last4("42a2").is_err());
/// ```
pub fn validate_card_last4(last4: &str) -> ValidationResult<()> {
    if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "last4".to_string(),
            reason: "must be exactly the last four digits of the card".to_string(),
        });
    }
    Ok(())
}

/// Validates a gateway authorization code.
pub fn validate_auth_code(auth_code: &str) -> ValidationResult<()> {
    let auth_code = auth_code.trim();

    if auth_code.is_empty() {
        return Err(ValidationError::Required {
            field: "auth_code".to_string(),
        });
    }

    if auth_code.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "auth_code".to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  create_transaction: one line per ticket type                          │
/// │                                                                         │
/// │  validate_quantity(qty) ← THIS FUNCTION                                 │
/// │       │                                                                 │
/// │       ├── qty <= 0?  → InvalidItems                                     │
/// │       ├── qty > 999? → InvalidItems                                     │
/// │       └── OK → line is priced                                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that may be zero but not negative (prices, tips,
/// discounts, opening balances).
///
/// ## Example
/// ```rust
/// use turnstile_core::money::{CurrencyCode, Money};
/// use turnstile_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("tip", Money::new(0, CurrencyCode::USD)).is_ok());
/// assert!(validate_non_negative("tip", Money::new(-1, CurrencyCode::USD)).is_err());
/// ```
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() || amount.minor() > MAX_AMOUNT_MINOR {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_MINOR,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (refunds, split parts).
pub fn validate_positive(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    if amount.minor() > MAX_AMOUNT_MINOR {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_AMOUNT_MINOR,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps as i64 > BPS_DENOMINATOR {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: BPS_DENOMINATOR,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on a transaction.
///
/// ## Rules
/// - At least one line
/// - At most MAX_ITEMS_PER_TRANSACTION (100)
pub fn validate_item_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if count > MAX_ITEMS_PER_TRANSACTION {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ITEMS_PER_TRANSACTION as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::CurrencyCode;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("event_id", "evt-2024-finals").is_ok());
        assert!(validate_identifier("event_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());

        assert!(validate_identifier("event_id", "").is_err());
        assert!(validate_identifier("event_id", "   ").is_err());
        assert!(validate_identifier("event_id", "has space").is_err());
        assert!(validate_identifier("event_id", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_text_trims() {
        assert_eq!(validate_text("reason", "  damaged  ").unwrap(), "damaged");
        assert!(validate_text("reason", "").is_err());
        assert!(validate_text("reason", &"x".repeat(501)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_card_last4() {
        assert!(validate_card_last4("4242").is_ok());
        assert!(validate_card_last4("424").is_err());
        assert!(validate_card_last4("4242424242424242").is_err());
        assert!(validate_card_last4("42 2").is_err());
    }

    #[test]
    fn test_validate_amounts() {
        let usd = |m| Money::new(m, CurrencyCode::USD);
        assert!(validate_positive("amount", usd(1)).is_ok());
        assert!(validate_positive("amount", usd(0)).is_err());
        assert!(validate_non_negative("tip", usd(0)).is_ok());
        assert!(validate_non_negative("tip", usd(-5)).is_err());

        assert!(validate_non_negative("tip", usd(MAX_AMOUNT_MINOR)).is_ok());
        assert!(matches!(
            validate_non_negative("tip", usd(i64::MAX)),
            Err(ValidationError::OutOfRange { max: MAX_AMOUNT_MINOR, .. })
        ));
        assert!(validate_positive("amount", usd(MAX_AMOUNT_MINOR + 1)).is_err());
    }

    #[test]
    fn test_validate_country_code() {
        assert!(validate_country_code("country", "US").is_ok());
        assert!(validate_country_code("country", "usa").is_err());
        assert!(validate_country_code("country", "1A").is_err());
    }

    #[test]
    fn test_validate_item_count() {
        assert!(validate_item_count(1).is_ok());
        assert!(validate_item_count(0).is_err());
        assert!(validate_item_count(101).is_err());
    }
}
