//! Daily sales report command.

use chrono::{NaiveDate, Utc};
use tracing::debug;

use turnstile_core::report::{self, DailySalesReport};

use crate::error::ApiResult;
use crate::state::{DbState, ReportCache, SettingsState};

/// Sales for one local calendar day of an event.
///
/// Served from the cache while fresh; recomputed from the transactions
/// table otherwise.
pub async fn daily_sales_report(
    db: &DbState,
    settings: &SettingsState,
    reports: &ReportCache,
    date: NaiveDate,
    event_id: &str,
) -> ApiResult<DailySalesReport> {
    if let Some(cached) = reports.get(date, event_id) {
        debug!(%date, event_id, "Daily report served from cache");
        return Ok(cached);
    }

    let settings = settings.current();
    let (start, end) = report::day_bounds(date, settings.utc_offset());
    let candidates = db
        .inner()
        .transactions()
        .list_for_report(event_id, start, end)
        .await?;

    let daily = report::daily_sales_report(date, event_id, &candidates, &settings, Utc::now());
    debug!(
        %date,
        event_id,
        transactions = daily.transaction_count,
        net = %daily.net_sales,
        "Daily report computed"
    );

    reports.insert(daily.clone());
    Ok(daily)
}
