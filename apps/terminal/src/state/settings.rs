//! # Settings State
//!
//! The settings provider: deployment settings plus the fraud screen built
//! from them.
//!
//! ## Runtime Updates
//! `update()` validates and swaps the whole `Settings` value. Transactions
//! snapshot currency and per-item tax rates when they are created, so an
//! update only affects transactions created afterwards.

use std::sync::RwLock;
use tracing::info;

use turnstile_core::fraud::FraudScreen;
use turnstile_core::Settings;

use crate::error::{ApiError, ApiResult};

pub struct SettingsState {
    settings: RwLock<Settings>,
    fraud_screen: FraudScreen,
}

impl SettingsState {
    /// Uses the standard fraud rules.
    pub fn new(settings: Settings) -> Self {
        Self::with_fraud_screen(settings, FraudScreen::standard())
    }

    pub fn with_fraud_screen(settings: Settings, fraud_screen: FraudScreen) -> Self {
        SettingsState {
            settings: RwLock::new(settings),
            fraud_screen,
        }
    }

    /// A snapshot of the current settings.
    pub fn current(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn fraud_screen(&self) -> &FraudScreen {
        &self.fraud_screen
    }

    /// Replaces the settings after validating them.
    ///
    /// The deployment currency is fixed: stored amounts and open drawers are
    /// denominated in it.
    pub fn update(&self, new_settings: Settings) -> ApiResult<Settings> {
        new_settings
            .validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;

        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        if new_settings.currency != settings.currency {
            return Err(ApiError::validation(format!(
                "currency cannot change at runtime ({} configured)",
                settings.currency
            )));
        }

        info!(
            tax_rate_bps = new_settings.tax_rate_bps,
            fraud_threshold_minor = new_settings.fraud_threshold_minor,
            "Settings updated"
        );
        *settings = new_settings.clone();
        Ok(new_settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use turnstile_core::CurrencyCode;

    #[test]
    fn test_update_swaps_settings() {
        let state = SettingsState::new(Settings::default());
        let updated = state
            .update(Settings {
                tax_rate_bps: 1000,
                ..Settings::default()
            })
            .unwrap();

        assert_eq!(updated.tax_rate_bps, 1000);
        assert_eq!(state.current().tax_rate_bps, 1000);
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let state = SettingsState::new(Settings::default());

        let err = state
            .update(Settings {
                tax_rate_bps: 50_000,
                ..Settings::default()
            })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = state
            .update(Settings {
                currency: CurrencyCode::EUR,
                ..Settings::default()
            })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        assert_eq!(state.current(), Settings::default());
    }
}
