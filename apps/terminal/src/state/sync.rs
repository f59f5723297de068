//! # Sync State
//!
//! Owns the background sync worker, if one runs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync State                                        │
//! │                                                                         │
//! │  remote_url set ──► HttpRemoteLedger ──► SyncWorker::spawn ──► handle   │
//! │  remote_url unset ─► offline: no worker, queue keeps growing            │
//! │                                                                         │
//! │  Either way the queue lives in the database, so status, failed-entry   │
//! │  listing and manual retry work offline too.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::info;

use turnstile_core::sync::SyncQueueEntry;
use turnstile_db::Database;
use turnstile_sync::{
    HttpRemoteLedger, RemoteLedger, SyncConfig, SyncHandle, SyncStatusReport, SyncWorker,
};

use crate::error::ApiResult;

pub struct SyncState {
    db: Database,
    handle: Option<SyncHandle>,
}

impl SyncState {
    /// Starts a worker against the configured remote, or stays offline.
    pub fn start(db: Database, config: SyncConfig, device_id: &str) -> ApiResult<Self> {
        match config.remote_url()? {
            Some(url) => {
                let remote = HttpRemoteLedger::new(&url, config.request_timeout())?;
                info!(endpoint = %remote.endpoint(), "Starting sync worker");
                Ok(Self::with_remote(db, Arc::new(remote), config, device_id))
            }
            None => {
                info!("No remote ledger configured; running offline");
                Ok(Self::offline(db))
            }
        }
    }

    /// Starts a worker against any remote ledger.
    pub fn with_remote(
        db: Database,
        remote: Arc<dyn RemoteLedger>,
        config: SyncConfig,
        device_id: &str,
    ) -> Self {
        let handle = SyncWorker::new(db.clone(), remote, config)
            .with_device_id(device_id)
            .spawn();
        SyncState {
            db,
            handle: Some(handle),
        }
    }

    pub fn offline(db: Database) -> Self {
        SyncState { db, handle: None }
    }

    pub fn is_online(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn status(&self) -> ApiResult<SyncStatusReport> {
        match &self.handle {
            Some(handle) => Ok(handle.status().await?),
            None => {
                let stats = self.db.sync_queue().stats().await?;
                Ok(SyncStatusReport::new(stats, None))
            }
        }
    }

    pub async fn list_failed(&self) -> ApiResult<Vec<SyncQueueEntry>> {
        Ok(self.db.sync_queue().list_failed().await?)
    }

    /// Puts a failed entry back in line and asks for a round.
    pub async fn retry(&self, seq: i64) -> ApiResult<SyncQueueEntry> {
        let entry = self.db.sync_queue().retry(seq).await?;
        info!(seq, key = %entry.idempotency_key, "Sync entry queued for retry");
        self.trigger()?;
        Ok(entry)
    }

    /// Requests a delivery round now (e.g. connectivity regained). No-op offline.
    pub fn trigger(&self) -> ApiResult<()> {
        if let Some(handle) = &self.handle {
            handle.trigger()?;
        }
        Ok(())
    }

    /// Stops the worker; the queue stays as it is for the next start.
    pub async fn shutdown(&self) -> ApiResult<()> {
        if let Some(handle) = &self.handle {
            handle.shutdown().await?;
        }
        Ok(())
    }
}
