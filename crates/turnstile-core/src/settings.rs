//! # Settings
//!
//! Per-deployment configuration supplied by the settings provider: currency,
//! tax rate, tip presets and fraud thresholds.
//!
//! ## Snapshot Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Settings v1 (tax 8%)          Settings v2 (tax 9%)                     │
//! │        │                              │                                 │
//! │        ▼                              ▼                                 │
//! │  txn A created ──► items carry 800 bps                                  │
//! │                               txn B created ──► items carry 900 bps     │
//! │                                                                         │
//! │  Updating settings never touches A: each transaction snapshots the      │
//! │  currency and the per-item tax rate at creation time.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{CurrencyCode, Money, BPS_DENOMINATOR};
use crate::types::TaxRate;
use crate::error::ValidationError;
use crate::validation::{validate_country_code, ValidationResult};

/// Largest UTC offset allowed for report bucketing (UTC+14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Deployment settings.
///
/// Deserialized from the `[settings]` section of the terminal config; every
/// field has a default so a partial section is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct Settings {
    /// ISO 4217 currency for every amount in this deployment.
    #[ts(as = "String")]
    pub currency: CurrencyCode,

    /// Default sales tax in basis points (800 = 8%).
    pub tax_rate_bps: u32,

    /// Tip suggestions in basis points, shown at capture time.
    pub tip_presets_bps: Vec<u32>,

    /// Captures above this amount (minor units) raise a `suspicious_amount` alert.
    pub fraud_threshold_minor: i64,

    /// Prior captures per customer within the window that trigger a velocity
    /// alert. Zero disables the rule.
    pub velocity_limit: u32,

    /// Velocity look-back window in seconds.
    pub velocity_window_secs: u64,

    /// ISO 3166 alpha-2 country of the venue, for location checks.
    pub venue_country: Option<String>,

    /// Offset from UTC used to bucket report hours and days.
    pub utc_offset_minutes: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            currency: CurrencyCode::USD,
            tax_rate_bps: 800,
            tip_presets_bps: vec![1500, 1800, 2000],
            fraud_threshold_minor: 50_000,
            velocity_limit: 5,
            velocity_window_secs: 3600,
            venue_country: None,
            utc_offset_minutes: 0,
        }
    }
}

/// A tip suggestion computed from a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TipSuggestion {
    pub rate_bps: u32,
    pub amount: Money,
}

impl Settings {
    /// Checks every field; called on load and before a runtime update is applied.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.tax_rate_bps as i64 > BPS_DENOMINATOR {
            return Err(ValidationError::OutOfRange {
                field: "tax_rate_bps".to_string(),
                min: 0,
                max: BPS_DENOMINATOR,
            });
        }

        if self
            .tip_presets_bps
            .iter()
            .any(|bps| *bps as i64 > BPS_DENOMINATOR)
        {
            return Err(ValidationError::OutOfRange {
                field: "tip_presets_bps".to_string(),
                min: 0,
                max: BPS_DENOMINATOR,
            });
        }

        if self.fraud_threshold_minor <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "fraud_threshold_minor".to_string(),
            });
        }

        if self.velocity_limit > 0 && self.velocity_window_secs == 0 {
            return Err(ValidationError::MustBePositive {
                field: "velocity_window_secs".to_string(),
            });
        }

        if let Some(country) = &self.venue_country {
            validate_country_code("venue_country", country)?;
        }

        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ValidationError::OutOfRange {
                field: "utc_offset_minutes".to_string(),
                min: -(MAX_UTC_OFFSET_MINUTES as i64),
                max: MAX_UTC_OFFSET_MINUTES as i64,
            });
        }

        Ok(())
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    #[inline]
    pub fn fraud_threshold(&self) -> Money {
        Money::new(self.fraud_threshold_minor, self.currency)
    }

    /// Zero in the configured currency.
    #[inline]
    pub fn zero(&self) -> Money {
        Money::zero(self.currency)
    }

    /// Applies each tip preset to `base`, rounding half-up.
    ///
    /// ## Example
    /// ```rust
    /// use turnstile_core::money::{CurrencyCode, Money};
    /// use turnstile_core::settings::Settings;
    ///
    /// let settings = Settings::default(); // 15%, 18%, 20%
    /// let tips = settings.suggested_tips(Money::new(2700, CurrencyCode::USD));
    /// let amounts: Vec<i64> = tips.iter().map(|t| t.amount.minor()).collect();
    /// assert_eq!(amounts, vec![405, 486, 540]);
    /// ```
    pub fn suggested_tips(&self, base: Money) -> Vec<TipSuggestion> {
        self.tip_presets_bps
            .iter()
            .map(|bps| TipSuggestion {
                rate_bps: *bps,
                amount: base.apply_bps(*bps),
            })
            .collect()
    }

    /// The venue's fixed UTC offset. Falls back to UTC if out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_tax() {
        let settings = Settings {
            tax_rate_bps: 10_001,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_country_and_offset() {
        let settings = Settings {
            venue_country: Some("USA".into()),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            utc_offset_minutes: 15 * 60,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_suggested_tips_round_half_up() {
        let settings = Settings {
            tip_presets_bps: vec![1500],
            ..Settings::default()
        };
        // 15% of $0.10 = 1.5 cents → 2 cents
        let tips = settings.suggested_tips(Money::new(10, CurrencyCode::USD));
        assert_eq!(tips[0].amount.minor(), 2);
    }

    #[test]
    fn test_partial_toml_like_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"currency":"EUR","tax_rate_bps":2000}"#).unwrap();
        assert_eq!(settings.currency, CurrencyCode::EUR);
        assert_eq!(settings.tax_rate_bps, 2000);
        assert_eq!(settings.velocity_limit, 5);
    }

    #[test]
    fn test_utc_offset() {
        let settings = Settings {
            utc_offset_minutes: -300,
            ..Settings::default()
        };
        assert_eq!(settings.utc_offset().local_minus_utc(), -300 * 60);
    }
}
