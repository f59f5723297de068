//! # Commands Module
//!
//! Every operation the terminal exposes to a UI shell or kiosk flow.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs          ◄─── You are here (exports)
//! ├── transaction.rs  ◄─── Create, capture, refund, void
//! ├── drawer.rs       ◄─── Open, count, close cash drawers
//! ├── report.rs       ◄─── Daily sales report
//! ├── settings.rs     ◄─── Runtime settings
//! └── sync.rs         ◄─── Sync queue status and control
//! ```
//!
//! ## State Injection
//! Each command takes only the state it needs:
//! ```rust,ignore
//! // Read only
//! async fn get_transaction(db: &DbState, id: &str)
//!
//! // Mutation: serialized per entity, cached reports dropped on commit
//! async fn refund_transaction(db: &DbState, locks: &EntityLocks, reports: &ReportCache, ...)
//!
//! // Sync commands
//! async fn sync_status(sync: &SyncState)
//! ```
//!
//! Every command returns `ApiResult<T>`; see [`crate::error`] for the codes.

pub mod drawer;
pub mod report;
pub mod settings;
pub mod sync;
pub mod transaction;
