//! # turnstile-db: Durable Ledger Store for Turnstile
//!
//! SQLite persistence for the box-office ledger: transactions, cash drawer
//! sessions, cash movements and the sync queue.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Turnstile Data Flow                              │
//! │                                                                         │
//! │  Terminal command (capture_payment)                                     │
//! │       │  turnstile-core computes the new record + cash movement + intent│
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  turnstile-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ Transactions   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Drawers        │    │ 0001_init    │  │   │
//! │  │   │ commit(set)   │    │ SyncQueue      │    │ ...          │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL, synchronous=FULL)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and the atomic `commit`
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories and change sets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turnstile_db::{ChangeSet, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//!
//! let outcome = ledger::create_transaction(&settings, input, Utc::now())?;
//! db.commit(ChangeSet::from_ledger(outcome, None, true)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::changeset::ChangeSet;
pub use repository::drawer::DrawerRepository;
pub use repository::sync_queue::{SyncQueueRepository, SyncQueueStats};
pub use repository::transaction::TransactionRepository;
