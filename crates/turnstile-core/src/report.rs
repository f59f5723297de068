//! # Reporting Aggregator
//!
//! Read-only daily rollups computed from ledger records.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transactions (one event, one local day)                                │
//! │        │                                                                │
//! │        ├── completed / refunded ──► totals, per method, per staff,      │
//! │        │                            hourly buckets, top items           │
//! │        └── voided ────────────────► voided_count                        │
//! │                                                                         │
//! │  Days and hours are local to the venue (`utc_offset_minutes`).          │
//! │  Refunds are attributed to the day of the sale they reverse.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports are diagnostic. They may lag the ledger by one write and are
//! never a source of truth.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::money::{CurrencyCode, Money};
use crate::settings::Settings;
use crate::types::{PaymentMethod, Transaction, TransactionStatus};

/// How many items the top-sellers list keeps.
pub const TOP_ITEMS_LIMIT: usize = 10;

// =============================================================================
// Report Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodBreakdown {
    pub method: PaymentMethod,
    pub count: u32,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StaffBreakdown {
    pub staff_id: String,
    pub count: u32,
    pub gross: Money,
    pub refunds: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HourlyBucket {
    /// Local hour of day, 0-23.
    pub hour: u32,
    pub count: u32,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemSales {
    pub item_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: Money,
}

/// Daily sales for one event, keyed by `(date, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySalesReport {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub event_id: String,
    #[ts(as = "String")]
    pub currency: CurrencyCode,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,

    /// Sum of captured totals (tips included, discounts removed).
    pub gross_sales: Money,
    pub refunds: Money,
    pub net_sales: Money,
    pub tax_collected: Money,
    pub tips: Money,
    pub discounts: Money,

    pub transaction_count: u32,
    pub voided_count: u32,
    /// Fully refunded transactions.
    pub refunded_count: u32,
    pub average_ticket: Money,

    pub by_payment_method: Vec<MethodBreakdown>,
    pub by_staff: Vec<StaffBreakdown>,
    /// Always 24 buckets.
    pub hourly: Vec<HourlyBucket>,
    pub top_items: Vec<ItemSales>,
}

// =============================================================================
// Aggregation
// =============================================================================

/// UTC bounds `[start, end)` of a local calendar day.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    let start = offset
        .from_local_datetime(&local_midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&local_midnight));
    (start, start + Duration::days(1))
}

/// Builds the report from the candidate transactions.
///
/// Callers may pass a superset (e.g. everything touched that day); records
/// from other events or outside the local day are ignored here.
pub fn daily_sales_report(
    date: NaiveDate,
    event_id: &str,
    transactions: &[Transaction],
    settings: &Settings,
    now: DateTime<Utc>,
) -> DailySalesReport {
    let currency = settings.currency;
    let offset = settings.utc_offset();
    let (start, end) = day_bounds(date, offset);
    let zero = Money::zero(currency);
    let in_day = |ts: DateTime<Utc>| ts >= start && ts < end;

    let mut report = DailySalesReport {
        date,
        event_id: event_id.to_string(),
        currency,
        generated_at: now,
        gross_sales: zero,
        refunds: zero,
        net_sales: zero,
        tax_collected: zero,
        tips: zero,
        discounts: zero,
        transaction_count: 0,
        voided_count: 0,
        refunded_count: 0,
        average_ticket: zero,
        by_payment_method: Vec::new(),
        by_staff: Vec::new(),
        hourly: (0..24)
            .map(|hour| HourlyBucket {
                hour,
                count: 0,
                amount: zero,
            })
            .collect(),
        top_items: Vec::new(),
    };

    let mut methods: BTreeMap<PaymentMethod, MethodBreakdown> = BTreeMap::new();
    let mut staff: BTreeMap<String, StaffBreakdown> = BTreeMap::new();
    let mut items: HashMap<String, ItemSales> = HashMap::new();

    for txn in transactions
        .iter()
        .filter(|t| t.event_id == event_id && t.currency() == currency)
    {
        if txn.status == TransactionStatus::Voided {
            if in_day(txn.created_at) {
                report.voided_count += 1;
            }
            continue;
        }

        let completed_at = match txn.completed_at {
            Some(at)
                if in_day(at)
                    && matches!(
                        txn.status,
                        TransactionStatus::Completed | TransactionStatus::Refunded
                    ) =>
            {
                at
            }
            _ => continue,
        };

        let refunded = txn.refunded_amount();
        report.transaction_count += 1;
        report.gross_sales += txn.total_amount;
        report.refunds += refunded;
        report.tax_collected += txn.tax_amount;
        report.tips += txn.tip_amount;
        report.discounts += txn.discount_amount;
        if txn.status == TransactionStatus::Refunded {
            report.refunded_count += 1;
        }

        if let Some(method) = txn.payment_method {
            let entry = methods.entry(method).or_insert(MethodBreakdown {
                method,
                count: 0,
                amount: zero,
            });
            entry.count += 1;
            entry.amount += txn.total_amount;
        }

        let entry = staff
            .entry(txn.staff_id.clone())
            .or_insert_with(|| StaffBreakdown {
                staff_id: txn.staff_id.clone(),
                count: 0,
                gross: zero,
                refunds: zero,
            });
        entry.count += 1;
        entry.gross += txn.total_amount;
        entry.refunds += refunded;

        let hour = completed_at.with_timezone(&offset).hour() as usize;
        if let Some(bucket) = report.hourly.get_mut(hour) {
            bucket.count += 1;
            bucket.amount += txn.total_amount;
        }

        for item in &txn.items {
            let entry = items.entry(item.id.clone()).or_insert_with(|| ItemSales {
                item_id: item.id.clone(),
                name: item.name.clone(),
                quantity: 0,
                revenue: zero,
            });
            entry.quantity += item.quantity;
            entry.revenue += item.total_price();
        }
    }

    report.net_sales = report.gross_sales - report.refunds;
    report.average_ticket = report.gross_sales.div_round(report.transaction_count as i64);
    report.by_payment_method = methods.into_values().collect();
    report.by_staff = staff.into_values().collect();

    let mut top: Vec<ItemSales> = items.into_values().collect();
    top.sort_by(|a, b| {
        b.revenue
            .minor()
            .cmp(&a.revenue.minor())
            .then_with(|| a.name.cmp(&b.name))
    });
    top.truncate(TOP_ITEMS_LIMIT);
    report.top_items = top;

    report
}

// =============================================================================
// Unit Tests
// =============================================================================
