//! # State Module
//!
//! Long-lived state shared by every command.
//!
//! Commands take only the state objects they need, so each one's signature
//! says what it touches:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌──────────────┐ ┌───────────────┐ ┌──────────────┐                    │
//! │  │   DbState    │ │ SettingsState │ │ EntityLocks  │                    │
//! │  │              │ │               │ │              │                    │
//! │  │  Database    │ │ RwLock<       │ │ one async    │                    │
//! │  │  (SQLite     │ │   Settings>   │ │ mutex per    │                    │
//! │  │   pool)      │ │ FraudScreen   │ │ entity id    │                    │
//! │  └──────────────┘ └───────────────┘ └──────────────┘                    │
//! │                                                                         │
//! │  ┌──────────────┐ ┌───────────────┐                                     │
//! │  │ ReportCache  │ │  SyncState    │                                     │
//! │  │              │ │               │                                     │
//! │  │ (date,event) │ │ SyncHandle    │                                     │
//! │  │  → report    │ │ (None while   │                                     │
//! │  │  with TTL    │ │  offline)     │                                     │
//! │  └──────────────┘ └───────────────┘                                     │
//! │                                                                         │
//! │  THREAD SAFETY:                                                        │
//! │  • DbState: Database has internal connection pool (thread-safe)        │
//! │  • SettingsState: swapped whole under a write lock                     │
//! │  • EntityLocks: held across read-validate-commit of one mutation       │
//! │  • ReportCache: short std Mutex sections, never held across .await     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod db;
mod locks;
mod report_cache;
mod settings;
mod sync;

pub use db::DbState;
pub use locks::EntityLocks;
pub use report_cache::ReportCache;
pub use settings::SettingsState;
pub use sync::SyncState;
