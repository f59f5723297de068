//! # Sync Worker
//!
//! Replays the durable sync queue against the remote ledger.
//!
//! ## Delivery Round
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Worker Round                               │
//! │                                                                         │
//! │  1. Fetch: due heads only (oldest entry per entity, pending, due now)   │
//! │            ORDER BY priority DESC, seq ASC LIMIT batch_size             │
//! │                                                                         │
//! │  2. Deliver each entry, wrapped in a request timeout                    │
//! │       Accepted / Duplicate ─► DELETE entry                              │
//! │       retryable, attempts < max ─► attempts += 1, next_attempt = backoff│
//! │       otherwise ─► status = failed (waits for a manual retry)           │
//! │                                                                         │
//! │  3. Anything delivered? Fetch again: the next entry of each delivered   │
//! │     entity is now a head.                                               │
//! │                                                                         │
//! │  TRIGGERS:                                                              │
//! │  • Poll interval tick                                                   │
//! │  • SyncHandle::trigger() (connectivity regained, manual retry)          │
//! │  • SyncHandle::shutdown() stops between or inside rounds                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every queue update is a single statement, so stopping mid-round leaves
//! each entry either untouched, rescheduled, failed or gone. An entry the
//! remote accepted but that was not yet deleted is delivered again and
//! deduplicated remotely by its idempotency key.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use turnstile_core::sync::SyncQueueEntry;
use turnstile_db::{Database, SyncQueueStats};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{DeliveryReceipt, RemoteLedger, SyncEnvelope};

// =============================================================================
// Status
// =============================================================================

/// What the worker itself knows, independent of the queue contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub running: bool,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Queue counters plus worker state, as shown to an operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    pub pending: i64,
    pub failed: i64,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    /// False while no remote is configured.
    pub online: bool,
    pub running: bool,
    pub last_delivery_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatusReport {
    pub fn new(stats: SyncQueueStats, worker: Option<WorkerStatus>) -> Self {
        let online = worker.is_some();
        let worker = worker.unwrap_or_default();
        SyncStatusReport {
            pending: stats.pending,
            failed: stats.failed,
            oldest_enqueued_at: stats.oldest_enqueued_at,
            online,
            running: worker.running,
            last_delivery_at: worker.last_delivery_at,
            last_error: worker.last_error,
        }
    }
}

/// Counts for one `deliver_due` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn is_idle(&self) -> bool {
        self.delivered == 0 && self.retried == 0 && self.failed == 0
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Delivers queue entries to a remote ledger.
#[derive(Clone)]
pub struct SyncWorker {
    db: Database,
    remote: Arc<dyn RemoteLedger>,
    config: Arc<SyncConfig>,
    device_id: Option<String>,
    status: Arc<RwLock<WorkerStatus>>,
}

impl SyncWorker {
    pub fn new(db: Database, remote: Arc<dyn RemoteLedger>, config: SyncConfig) -> Self {
        SyncWorker {
            db,
            remote,
            config: Arc::new(config),
            device_id: None,
            status: Arc::new(RwLock::new(WorkerStatus::default())),
        }
    }

    /// Stamps outgoing envelopes with the terminal's device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub async fn status(&self) -> WorkerStatus {
        self.status.read().await.clone()
    }

    /// Delivers everything due at `now`, batch by batch.
    ///
    /// Delivery failures are recorded on the entries, not returned. Only a
    /// local database error ends the round early.
    pub async fn deliver_due(&self, now: DateTime<Utc>) -> SyncResult<DeliveryReport> {
        let mut report = DeliveryReport::default();

        loop {
            let entries = self
                .db
                .sync_queue()
                .due(now, self.config.batch_size)
                .await?;
            if entries.is_empty() {
                break;
            }

            let delivered_before = report.delivered;
            for entry in &entries {
                match self.deliver_one(entry).await {
                    Ok(receipt) => {
                        self.db.sync_queue().mark_delivered(entry.id).await?;
                        report.delivered += 1;
                        debug!(
                            seq = entry.id,
                            key = %entry.idempotency_key,
                            ?receipt,
                            "Delivered sync entry"
                        );
                    }
                    Err(err) => self.record_failure(entry, &err, now, &mut report).await?,
                }
            }

            if report.delivered == delivered_before {
                break;
            }
        }

        if report.delivered > 0 {
            let mut status = self.status.write().await;
            status.last_delivery_at = Some(Utc::now());
            if report.retried == 0 && report.failed == 0 {
                status.last_error = None;
            }
        }
        if !report.is_idle() {
            info!(
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                "Sync round finished"
            );
        }

        Ok(report)
    }

    async fn deliver_one(&self, entry: &SyncQueueEntry) -> SyncResult<DeliveryReceipt> {
        let envelope = SyncEnvelope::from_entry(entry, self.device_id.as_deref())?;

        tokio::time::timeout(self.config.request_timeout(), self.remote.deliver(&envelope))
            .await
            .map_err(|_| SyncError::Timeout(self.config.request_timeout_secs))?
    }

    async fn record_failure(
        &self,
        entry: &SyncQueueEntry,
        err: &SyncError,
        now: DateTime<Utc>,
        report: &mut DeliveryReport,
    ) -> SyncResult<()> {
        let attempts = u32::try_from(entry.attempts + 1).unwrap_or(u32::MAX);
        let message = err.to_string();

        if err.is_retryable() && attempts < self.config.max_attempts {
            let delay = self.config.retry_delay(attempts);
            let next_attempt_at = now
                + chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(self.config.max_backoff_secs as i64));

            self.db
                .sync_queue()
                .reschedule(entry.id, &message, next_attempt_at)
                .await?;
            report.retried += 1;
            debug!(seq = entry.id, attempts, %next_attempt_at, error = %message, "Sync entry will retry");
        } else {
            self.db.sync_queue().mark_failed(entry.id, &message).await?;
            report.failed += 1;
            warn!(
                seq = entry.id,
                key = %entry.idempotency_key,
                attempts,
                error = %message,
                "Sync entry needs attention"
            );
        }

        self.status.write().await.last_error = Some(message);
        Ok(())
    }

    /// Starts the background loop and returns its handle.
    pub fn spawn(self) -> SyncHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(self.clone().run(trigger_rx, shutdown_rx));

        SyncHandle {
            worker: self,
            trigger_tx,
            shutdown_tx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    async fn run(self, mut trigger_rx: mpsc::Receiver<()>, mut shutdown_rx: mpsc::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            batch_size = self.config.batch_size,
            "Sync worker starting"
        );
        self.status.write().await.running = true;

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}

                Some(()) = trigger_rx.recv() => {
                    debug!("Sync round triggered");
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync worker shutting down");
                    break;
                }
            }

            tokio::select! {
                result = self.deliver_due(Utc::now()) => {
                    if let Err(e) = result {
                        error!(error = %e, "Sync round aborted");
                        self.status.write().await.last_error = Some(e.to_string());
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync worker shutting down mid-round");
                    break;
                }
            }
        }

        self.status.write().await.running = false;
        info!("Sync worker stopped");
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Controls a spawned worker.
#[derive(Clone)]
pub struct SyncHandle {
    worker: SyncWorker,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncHandle {
    /// Requests a round now. Coalesces with a trigger that is still pending.
    pub fn trigger(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::ShuttingDown),
        }
    }

    pub async fn worker_status(&self) -> WorkerStatus {
        self.worker.status().await
    }

    pub async fn status(&self) -> SyncResult<SyncStatusReport> {
        let stats = self.worker.db.sync_queue().stats().await?;
        Ok(SyncStatusReport::new(stats, Some(self.worker_status().await)))
    }

    /// Stops the loop and waits for it to finish. Safe to call twice.
    pub async fn shutdown(&self) -> SyncResult<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };

        // A closed channel means the loop is already gone.
        let _ = self.shutdown_tx.send(()).await;

        task.await
            .map_err(|e| SyncError::ChannelError(format!("sync task: {e}")))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
