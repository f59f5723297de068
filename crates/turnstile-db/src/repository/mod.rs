//! # Repository Module
//!
//! Database repository implementations for the Turnstile ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Terminal command                                                      │
//! │       │                                                                 │
//! │       │  db.transactions().get(id)                                      │
//! │       │  db.commit(ChangeSet::from_ledger(outcome, drawer, false))      │
//! │       ▼                                                                 │
//! │  TransactionRepository / DrawerRepository / SyncQueueRepository        │
//! │  ├── reads over the pool                                               │
//! │  └── pub(crate) row writers used only by ChangeSet::apply              │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Clean separation of concerns                                        │
//! │  • Easy to test (mock the repository)                                  │
//! │  • SQL is isolated in one place                                        │
//! │  • Can swap database implementations                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TransactionRepository`](transaction::TransactionRepository) - Ledger records
//! - [`DrawerRepository`](drawer::DrawerRepository) - Drawer sessions and cash movements
//! - [`SyncQueueRepository`](sync_queue::SyncQueueRepository) - Outbox delivery state
//! - [`ChangeSet`](changeset::ChangeSet) - Atomic multi-table writes

pub mod changeset;
pub mod drawer;
pub mod sync_queue;
pub mod transaction;
