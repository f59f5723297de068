//! # Entity Locks
//!
//! One exclusive async lock per entity, held for the whole
//! read → validate → commit of a mutation.
//!
//! ```text
//! refund A ──► lock(txn:T) ──► read T (v3) ──► check ≤ total ──► commit v4 ──► unlock
//! refund B ──► lock(txn:T) ···················· waits ························► read T (v4) ...
//! ```
//!
//! ## Keys and Order
//! - `txn:{transaction_id}`
//! - `drawer:{staff_id}`: a staff member has at most one active session, so
//!   the staff id names the drawer even before a session exists
//!
//! A command that needs both takes the transaction lock first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard for one entity. Dropping it releases the entity.
pub type EntityGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction(&self, transaction_id: &str) -> EntityGuard {
        self.lock(format!("txn:{}", transaction_id)).await
    }

    pub async fn drawer(&self, staff_id: &str) -> EntityGuard {
        self.lock(format!("drawer:{}", staff_id)).await
    }

    async fn lock(&self, key: String) -> EntityGuard {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on are dropped as we go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of entities currently locked or waited on.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_entity_is_exclusive() {
        let locks = Arc::new(EntityLocks::new());
        let guard = locks.transaction("txn-1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.transaction("txn-1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_entities_do_not_block() {
        let locks = EntityLocks::new();
        let _a = locks.transaction("txn-1").await;
        let _b = locks.transaction("txn-2").await;
        let _c = locks.drawer("staff-1").await;
        assert_eq!(locks.active(), 3);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = EntityLocks::new();
        drop(locks.transaction("txn-1").await);
        drop(locks.transaction("txn-2").await);
        assert_eq!(locks.active(), 0);

        let _c = locks.transaction("txn-3").await;
        assert_eq!(locks.locks.lock().unwrap().len(), 1);
    }
}
