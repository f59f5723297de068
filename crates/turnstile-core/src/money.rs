//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Repeated across tax → tip → partial refund → drawer balance, the      │
//! │  error drifts by whole cents over a long offline shift.                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + currency tag                       │
//! │    Money { minor: 2500, currency: USD }  = $25.00                      │
//! │    Rates are basis points, rounding is ROUND-HALF-UP, explicitly.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use turnstile_core::money::{CurrencyCode, Money};
//!
//! let usd = CurrencyCode::USD;
//! let price = Money::new(1099, usd); // $10.99
//!
//! let doubled = price * 2;                        // $21.98
//! let total = price + Money::new(500, usd);       // $15.99
//! assert_eq!(total.minor(), 1599);
//! assert_eq!(doubled.minor(), 2198);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: i64 = 10_000;

// =============================================================================
// Currency Code
// =============================================================================

/// ISO 4217 alphabetic currency code, stored inline so `Money` stays `Copy`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");
    pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");
    pub const GBP: CurrencyCode = CurrencyCode(*b"GBP");

    /// Returns the code as a string slice (always three ASCII uppercase letters).
    pub fn as_str(&self) -> &str {
        // Constructed only from validated ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }
}

impl FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bytes = upper.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidFormat {
                field: "currency".to_string(),
                reason: format!("'{}' is not a three-letter ISO 4217 code", s),
            });
        }
        Ok(CurrencyCode([bytes[0], bytes[1], bytes[2]]))
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyCode({})", self.as_str())
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        CurrencyCode::USD
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit, tagged with its currency.
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and variances can be negative
/// - **Currency tag**: amounts from different deployments never mix silently
/// - **Copy**: the tag is three inline bytes, so Money is still a value type
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  PaymentItem.unit_price × quantity ──► Transaction.subtotal             │
/// │                                            │                            │
/// │                       tax (round-half-up) ─┤                            │
/// │                       tip ─────────────────┤                            │
/// │                       discount ────────────┘                            │
/// │                                            ▼                            │
/// │                                   Transaction.total_amount              │
/// │                                            │                            │
/// │                 RefundRecord.amount ◄──────┴──► Drawer.expected_balance │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money {
    /// Amount in minor units (cents for USD).
    minor: i64,
    /// ISO 4217 currency code.
    #[ts(as = "String")]
    currency: CurrencyCode,
}

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    ///
    /// let price = Money::new(1099, CurrencyCode::USD); // $10.99
    /// assert_eq!(price.minor(), 1099);
    /// ```
    #[inline]
    pub const fn new(minor: i64, currency: CurrencyCode) -> Self {
        Money { minor, currency }
    }

    /// Zero in the given currency.
    #[inline]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Money { minor: 0, currency }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the currency tag.
    #[inline]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Returns the major unit portion (dollars), truncated toward zero.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.minor / 100
    }

    /// Returns the minor unit remainder (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.minor % 100).abs()
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.minor > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Returns true if both values carry the same currency.
    #[inline]
    pub fn same_currency(&self, other: &Money) -> bool {
        self.currency == other.currency
    }

    /// Fails with `CurrencyMismatch` unless this amount is in `expected`.
    pub fn check_currency(&self, expected: CurrencyCode) -> CoreResult<()> {
        if self.currency != expected {
            return Err(CoreError::CurrencyMismatch {
                expected,
                found: self.currency,
            });
        }
        Ok(())
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    ///
    /// let unit_price = Money::new(1000, CurrencyCode::USD);
    /// assert_eq!(unit_price.multiply_quantity(2).minor(), 2000);
    /// ```
    ///
    /// Saturates at the `i64` bounds. Amounts that passed validation are
    /// far below them; use [`Money::checked_mul_quantity`] on raw input.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money {
            minor: self.minor.saturating_mul(qty),
            currency: self.currency,
        }
    }

    /// Multiplies by a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    ///
    /// let unit_price = Money::new(i64::MAX / 2, CurrencyCode::USD);
    /// assert!(unit_price.checked_mul_quantity(3).is_none());
    /// ```
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        match self.minor.checked_mul(qty) {
            Some(minor) => Some(Money {
                minor,
                currency: self.currency,
            }),
            None => None,
        }
    }

    /// Adds two amounts of the same currency, `None` on overflow or mismatch.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        if !self.same_currency(&other) {
            return None;
        }
        self.minor.checked_add(other.minor).map(|minor| Money {
            minor,
            currency: self.currency,
        })
    }

    /// Subtracts an amount of the same currency, `None` on overflow or mismatch.
    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Self> {
        if !self.same_currency(&other) {
            return None;
        }
        self.minor.checked_sub(other.minor).map(|minor| Money {
            minor,
            currency: self.currency,
        })
    }

    /// Applies a rate in basis points with round-half-up at the minor unit.
    ///
    /// ## Rounding
    /// ```text
    /// exact = minor × bps / 10000
    ///   2500 × 800  / 10000 = 200.000  → 200
    ///   1000 × 825  / 10000 =  82.500  →  83   (half rounds up)
    ///  -1000 × 825  / 10000 = -82.500  → -83   (half rounds away from zero)
    /// ```
    /// Intermediate math runs in i128 so large amounts cannot overflow.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    ///
    /// let subtotal = Money::new(2500, CurrencyCode::USD);
    /// assert_eq!(subtotal.apply_bps(800).minor(), 200); // 8% of $25.00
    /// ```
    pub fn apply_bps(&self, bps: u32) -> Money {
        Money {
            minor: round_half_up_div(self.minor as i128 * bps as i128, BPS_DENOMINATOR as i128),
            currency: self.currency,
        }
    }
}

impl Money {
    /// Divides by a count with round-half-up (averages). Zero divisor yields zero.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    ///
    /// let gross = Money::new(1001, CurrencyCode::USD);
    /// assert_eq!(gross.div_round(2).minor(), 501);
    /// ```
    pub fn div_round(&self, divisor: i64) -> Money {
        if divisor == 0 {
            return Money::zero(self.currency);
        }
        let (numerator, denominator) = if divisor < 0 {
            (-(self.minor as i128), -(divisor as i128))
        } else {
            (self.minor as i128, divisor as i128)
        };
        Money {
            minor: round_half_up_div(numerator * 2, denominator * 2),
            currency: self.currency,
        }
    }
}

/// Integer division rounding half away from zero.
fn round_half_up_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount with its currency code, e.g. `25.00 USD`.
///
/// For debugging and logs. The UI formats money itself.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:02} {}",
            sign,
            self.major().abs(),
            self.minor_part(),
            self.currency
        )
    }
}

// Arithmetic between different currencies is a programming error: every
// amount in one transaction or drawer session is built from the same
// settings snapshot, and inputs are checked at the boundary (validation).

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in add");
        Money {
            minor: self.minor + other.minor,
            currency: self.currency,
        }
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in add");
        self.minor += other.minor;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in sub");
        Money {
            minor: self.minor - other.minor,
            currency: self.currency,
        }
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in sub");
        self.minor -= other.minor;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money {
            minor: -self.minor,
            currency: self.currency,
        }
    }
}

/// Amounts in different currencies are unordered.
impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        Some(self.minor.cmp(&other.minor))
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(minor: i64) -> Money {
        Money::new(minor, CurrencyCode::USD)
    }

    #[test]
    fn test_parts() {
        let money = usd(1099);
        assert_eq!(money.minor(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(usd(1099).to_string(), "10.99 USD");
        assert_eq!(usd(500).to_string(), "5.00 USD");
        assert_eq!(usd(-550).to_string(), "-5.50 USD");
        assert_eq!(usd(0).to_string(), "0.00 USD");
    }

    #[test]
    fn test_arithmetic() {
        let a = usd(1000);
        let b = usd(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((a * 3).minor(), 3000);
        assert_eq!((-a).minor(), -1000);
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(usd(1000).checked_mul_quantity(3), Some(usd(3000)));
        assert_eq!(usd(i64::MAX / 2).checked_mul_quantity(3), None);
        assert_eq!(usd(i64::MAX / 2).multiply_quantity(3).minor(), i64::MAX);

        assert_eq!(usd(1).checked_add(usd(2)), Some(usd(3)));
        assert_eq!(usd(i64::MAX).checked_add(usd(1)), None);
        assert_eq!(usd(1).checked_add(Money::new(1, CurrencyCode::EUR)), None);
        assert_eq!(usd(i64::MIN).checked_sub(usd(1)), None);
        assert_eq!(usd(5).checked_sub(usd(7)), Some(usd(-2)));
    }

    #[test]
    fn test_ordering_requires_same_currency() {
        assert!(usd(100) < usd(200));
        let eur = Money::new(100, CurrencyCode::EUR);
        assert_eq!(usd(100).partial_cmp(&eur), None);
        assert!(!(usd(100) <= eur));
    }

    #[test]
    fn test_apply_bps_exact() {
        // 8% of $25.00 = $2.00
        assert_eq!(usd(2500).apply_bps(800).minor(), 200);
    }

    #[test]
    fn test_apply_bps_rounds_half_up() {
        // $10.00 at 8.25% = $0.825 → $0.83
        assert_eq!(usd(1000).apply_bps(825).minor(), 83);
        // $0.05 at 10% = 0.5 cent → 1 cent
        assert_eq!(usd(5).apply_bps(1000).minor(), 1);
        // $0.04 at 10% = 0.4 cent → 0 cents
        assert_eq!(usd(4).apply_bps(1000).minor(), 0);
    }

    #[test]
    fn test_apply_bps_negative_rounds_away_from_zero() {
        assert_eq!(usd(-1000).apply_bps(825).minor(), -83);
    }

    #[test]
    fn test_apply_bps_large_amount_no_overflow() {
        let big = usd(i64::MAX / 2);
        let tax = big.apply_bps(10_000);
        assert_eq!(tax.minor(), i64::MAX / 2);
    }

    #[test]
    fn test_currency_code_parsing() {
        assert_eq!("usd".parse::<CurrencyCode>().unwrap(), CurrencyCode::USD);
        assert_eq!(" EUR ".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
        assert!("US".parse::<CurrencyCode>().is_err());
        assert!("US1".parse::<CurrencyCode>().is_err());
        assert!("DOLLAR".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&usd(2500)).unwrap();
        assert_eq!(json, r#"{"minor":2500,"currency":"USD"}"#);

        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, usd(2500));

        let bad = serde_json::from_str::<Money>(r#"{"minor":1,"currency":"??"}"#);
        assert!(bad.is_err());
    }

    /// $10.00 split three ways loses a cent; integer money makes that visible.
    #[test]
    fn test_division_precision_loss_documented() {
        let ten = usd(1000);
        let third = usd(1000 / 3);
        let reconstructed = third * 3;
        assert_eq!((ten - reconstructed).minor(), 1);
    }
}
