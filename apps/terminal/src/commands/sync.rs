//! Sync queue commands.
//!
//! These only touch the queue; ledger commands never wait on delivery.

use tracing::debug;

use turnstile_core::sync::SyncQueueEntry;
use turnstile_sync::SyncStatusReport;

use crate::error::ApiResult;
use crate::state::SyncState;

/// Queue depth, the oldest waiting entry and the worker's last result.
pub async fn sync_status(sync: &SyncState) -> ApiResult<SyncStatusReport> {
    sync.status().await
}

/// Entries that hit a permanent error or the attempt ceiling.
pub async fn list_failed_sync_entries(sync: &SyncState) -> ApiResult<Vec<SyncQueueEntry>> {
    sync.list_failed().await
}

/// Puts a failed entry back at the head of its entity's line.
pub async fn retry_sync_entry(sync: &SyncState, seq: i64) -> ApiResult<SyncQueueEntry> {
    debug!(seq, "retry_sync_entry command");
    sync.retry(seq).await
}

/// Asks the worker for a delivery round now.
pub fn trigger_sync(sync: &SyncState) -> ApiResult<()> {
    debug!("trigger_sync command");
    sync.trigger()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::transaction::create_transaction;
    use crate::error::ErrorCode;
    use crate::test_support::{line, new_sale, terminal};
    use turnstile_core::sync::SyncEntityType;

    #[tokio::test]
    async fn test_offline_queue_reports_pending() {
        let t = terminal().await;
        assert!(!t.sync.is_online());

        create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();
        trigger_sync(&t.sync).unwrap();

        let status = sync_status(&t.sync).await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.failed, 0);
        assert!(!status.online);
        assert!(status.oldest_enqueued_at.is_some());
        assert!(list_failed_sync_entries(&t.sync).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_unknown_entry() {
        let t = terminal().await;
        let err = retry_sync_entry(&t.sync, 999).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_retry_pending_entry_conflicts() {
        let t = terminal().await;
        let txn = create_transaction(&t.db, &t.settings, &t.reports, new_sale(vec![line("ga", 1000, 1)]))
            .await
            .unwrap();
        let queue = t.db.inner().sync_queue();
        let head = queue
            .list_for_entity(SyncEntityType::Transaction, &txn.id)
            .await
            .unwrap()
            .remove(0);

        let err = retry_sync_entry(&t.sync, head.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(sync_status(&t.sync).await.unwrap().pending, 1);
    }
}
