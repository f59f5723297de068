//! Runtime settings commands.

use tracing::debug;
use turnstile_core::Settings;

use crate::error::ApiResult;
use crate::state::SettingsState;

pub fn get_settings(settings: &SettingsState) -> Settings {
    settings.current()
}

/// Replaces the settings. Applies to transactions created afterwards;
/// stored transactions keep the amounts they were priced with.
pub fn update_settings(settings: &SettingsState, new_settings: Settings) -> ApiResult<Settings> {
    debug!("update_settings command");
    settings.update(new_settings)?;
    Ok(settings.current())
}
