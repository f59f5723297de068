//! # Report Cache
//!
//! Daily reports keyed by `(date, event_id)`, served for a short TTL.
//!
//! Reports are diagnostic read-models recomputed from the transactions
//! table. Every committed mutation for an event drops that event's entries,
//! so the TTL only bounds staleness from writes made elsewhere (a restore,
//! another process on the same file).

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use turnstile_core::report::DailySalesReport;

type ReportKey = (NaiveDate, String);

#[derive(Debug)]
pub struct ReportCache {
    ttl: Duration,
    entries: Mutex<HashMap<ReportKey, (Instant, DailySalesReport)>>,
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        ReportCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, date: NaiveDate, event_id: &str) -> Option<DailySalesReport> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let key = (date, event_id.to_string());

        match entries.get(&key) {
            Some((stored_at, report)) if stored_at.elapsed() < self.ttl => Some(report.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Stores a report, dropping every expired entry on the way.
    pub fn insert(&self, report: DailySalesReport) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(
            (report.date, report.event_id.clone()),
            (Instant::now(), report),
        );
    }

    /// Drops every cached day of `event_id`.
    pub fn invalidate_event(&self, event_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(_, cached_event), _| cached_event != event_id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
