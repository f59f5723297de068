//! # turnstile-sync: Durable Sync Delivery for Turnstile
//!
//! Every committed ledger or drawer mutation leaves an entry in the local
//! `sync_queue` table (written by `turnstile-db` in the same SQLite
//! transaction as the mutation). This crate replays those entries against
//! the remote system of record.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Architecture                               │
//! │                                                                         │
//! │   Ledger command ──► Database::commit(ChangeSet) ──► sync_queue row     │
//! │        │                                                 │              │
//! │        └── returns to caller (never waits on network)    │              │
//! │                                                          ▼              │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncWorker (tokio task)                       │  │
//! │  │                                                                  │  │
//! │  │  interval tick ─┐                                                │  │
//! │  │  trigger() ─────┼──► deliver_due(now) ──► RemoteLedger::deliver  │  │
//! │  │  shutdown() ────┘         │                    │                 │  │
//! │  │                           ▼                    ▼                 │  │
//! │  │             delete / reschedule / fail    HTTP or in-memory      │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  GUARANTEES:                                                           │
//! │  • At-least-once delivery, exactly-once effect via idempotency key     │
//! │  • Strict per-entity order; an undeliverable head blocks its entity    │
//! │  • Failed entries stay queued until an operator retries them           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - `[sync]` settings and retry schedule
//! - [`error`] - Sync error types and retry classification
//! - [`remote`] - `RemoteLedger` trait, HTTP and in-memory implementations
//! - [`worker`] - Delivery rounds, background loop and its handle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turnstile_sync::{HttpRemoteLedger, SyncConfig, SyncWorker};
//!
//! let config = SyncConfig::default();
//! let remote = HttpRemoteLedger::new(&url, config.request_timeout())?;
//! let handle = SyncWorker::new(db.clone(), Arc::new(remote), config).spawn();
//!
//! // Network came back
//! handle.trigger()?;
//!
//! // App exit
//! handle.shutdown().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod remote;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use remote::{DeliveryReceipt, HttpRemoteLedger, InMemoryRemoteLedger, RemoteLedger, SyncEnvelope};
pub use worker::{DeliveryReport, SyncHandle, SyncStatusReport, SyncWorker, WorkerStatus};
