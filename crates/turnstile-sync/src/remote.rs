//! # Remote Ledger
//!
//! The system of record that queue entries are delivered to.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  deliver(envelope)                                                      │
//! │    Ok(Accepted)        first time this idempotency key was seen         │
//! │    Ok(Duplicate)       key already applied remotely; same effect        │
//! │    Err(retryable)      network, timeout, 408 / 429 / 5xx                │
//! │    Err(final)          any other refusal                                │
//! │                                                                         │
//! │  At-least-once delivery from the worker, exactly-once effect on the     │
//! │  remote through the idempotency key.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## HTTP Mapping
//! `POST {remote_url}sync/entries` with an `Idempotency-Key` header and the
//! envelope as JSON. 2xx is accepted, 409 is a duplicate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use turnstile_core::sync::{SyncEntityType, SyncQueueEntry};

/// Path appended to the remote base URL.
const ENTRIES_PATH: &str = "sync/entries";

// =============================================================================
// Envelope
// =============================================================================

/// What goes over the wire for one queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    pub idempotency_key: String,
    pub operation: String,
    pub entity_type: SyncEntityType,
    pub entity_id: String,
    pub device_id: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// 1 for the first try.
    pub attempt: i64,
    /// Snapshot of the entity after the mutation.
    pub payload: serde_json::Value,
}

impl SyncEnvelope {
    /// Wraps a queue entry. An unreadable payload is a final error.
    pub fn from_entry(entry: &SyncQueueEntry, device_id: Option<&str>) -> SyncResult<Self> {
        let payload = serde_json::from_str(&entry.payload)
            .map_err(|e| SyncError::InvalidPayload(format!("entry {}: {}", entry.id, e)))?;

        Ok(SyncEnvelope {
            idempotency_key: entry.idempotency_key.clone(),
            operation: entry.operation_type.clone(),
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            device_id: device_id.map(str::to_string),
            enqueued_at: entry.enqueued_at,
            attempt: entry.attempts + 1,
            payload,
        })
    }
}

/// Successful delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryReceipt {
    Accepted,
    Duplicate,
}

// =============================================================================
// Trait
// =============================================================================

/// The remote system of record.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    async fn deliver(&self, envelope: &SyncEnvelope) -> SyncResult<DeliveryReceipt>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Remote ledger reached over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpRemoteLedger {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRemoteLedger {
    /// Builds a client for `base_url`. A missing trailing slash is added so
    /// the entries path joins under it rather than replacing the last segment.
    pub fn new(base_url: &Url, timeout: Duration) -> SyncResult<Self> {
        let mut base = base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(ENTRIES_PATH)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(HttpRemoteLedger {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteLedger for HttpRemoteLedger {
    async fn deliver(&self, envelope: &SyncEnvelope) -> SyncResult<DeliveryReceipt> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Idempotency-Key", &envelope.idempotency_key)
            .json(envelope)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryReceipt::Accepted);
        }
        if status == reqwest::StatusCode::CONFLICT {
            debug!(key = %envelope.idempotency_key, "Remote already has entry");
            return Ok(DeliveryReceipt::Duplicate);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            key = %envelope.idempotency_key,
            "Remote refused entry"
        );
        Err(SyncError::from_status(status.as_u16(), body))
    }
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

#[derive(Debug, Default)]
struct InMemoryState {
    seen: HashSet<String>,
    applied: Vec<SyncEnvelope>,
    calls: usize,
    scripted: VecDeque<SyncError>,
    offline: bool,
}

/// A remote that keeps everything in memory and deduplicates by key.
///
/// Used as the test double and for running a terminal with nowhere to sync to.
#[derive(Debug, Default)]
pub struct InMemoryRemoteLedger {
    state: Mutex<InMemoryState>,
}

impl InMemoryRemoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a retryable connection error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// The next call fails with `error` (queued, one per call).
    pub async fn fail_next(&self, error: SyncError) {
        self.state.lock().await.scripted.push_back(error);
    }

    /// Entries applied, once per idempotency key, in arrival order.
    pub async fn applied(&self) -> Vec<SyncEnvelope> {
        self.state.lock().await.applied.clone()
    }

    /// Every `deliver` call, including failures and duplicates.
    pub async fn calls(&self) -> usize {
        self.state.lock().await.calls
    }
}

#[async_trait]
impl RemoteLedger for InMemoryRemoteLedger {
    async fn deliver(&self, envelope: &SyncEnvelope) -> SyncResult<DeliveryReceipt> {
        let mut state = self.state.lock().await;
        state.calls += 1;

        if state.offline {
            return Err(SyncError::ConnectionFailed("remote offline".into()));
        }
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }

        if state.seen.insert(envelope.idempotency_key.clone()) {
            state.applied.push(envelope.clone());
            Ok(DeliveryReceipt::Accepted)
        } else {
            Ok(DeliveryReceipt::Duplicate)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
