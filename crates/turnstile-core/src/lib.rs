//! # turnstile-core: Pure Ledger Logic for Turnstile
//!
//! This crate is the **heart** of Turnstile, the box-office point-of-sale
//! ledger. It contains every money rule as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Turnstile Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI / Kiosk flow                              │   │
//! │  │    Sell ──► Capture ──► Refund / Void ──► Drawer close         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 Terminal commands (apps/terminal)               │   │
//! │  │        locks ──► load ──► core transition ──► commit           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ turnstile-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ │   │
//! │  │   │  money  │ │ ledger  │ │ drawer  │ │  fraud  │ │ report  │ │   │
//! │  │   │settings │ │  state  │ │ balance │ │  rules  │ │ rollups │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • NO CLOCK                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        turnstile-db (SQLite)  ·  turnstile-sync (delivery)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money with a currency tag and round-half-up rate math
//! - [`settings`] - Per-deployment configuration
//! - [`types`] - Domain types (Transaction, CashDrawerSession, ...)
//! - [`ledger`] - Transaction state machine
//! - [`fraud`] - Advisory fraud rules
//! - [`drawer`] - Cash drawer sessions
//! - [`report`] - Daily sales aggregation
//! - [`sync`] - Sync queue records and idempotency keys
//! - [`error`] - Domain error types
//! - [`validation`] - Field rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: callers pass `now`, results depend only on inputs
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: minor units plus currency, never floating point
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use turnstile_core::ledger::{create_transaction, LineItemInput, NewTransaction};
//! use turnstile_core::money::{CurrencyCode, Money};
//! use turnstile_core::settings::Settings;
//!
//! let settings = Settings::default(); // USD, 8% tax
//! let outcome = create_transaction(
//!     &settings,
//!     NewTransaction {
//!         id: None,
//!         event_id: "evt-1".into(),
//!         staff_id: "staff-1".into(),
//!         device_id: None,
//!         customer: None,
//!         items: vec![LineItemInput {
//!             id: "ga".into(),
//!             name: "General Admission".into(),
//!             quantity: 2,
//!             unit_price: Money::new(1000, CurrencyCode::USD),
//!             tax_rate_bps: None,
//!             category: None,
//!         }],
//!         discount: None,
//!     },
//!     Utc::now(),
//! )
//! .unwrap();
//!
//! assert_eq!(outcome.transaction.total_amount.minor(), 2160);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod drawer;
pub mod error;
pub mod fraud;
pub mod ledger;
pub mod money;
pub mod report;
pub mod settings;
pub mod sync;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use turnstile_core::Money` instead of
// `use turnstile_core::money::Money`

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::{CurrencyCode, Money};
pub use settings::Settings;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed on a single transaction.
pub const MAX_ITEMS_PER_TRANSACTION: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typos at the box office (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum tenders in a split payment.
pub const MAX_SPLIT_PARTS: usize = 8;

/// Largest single amount accepted from input, in minor units.
///
/// 10^13 minor units is 100 billion in a two-decimal currency. With the item
/// and quantity limits above, every derived total stays well inside `i64`.
pub const MAX_AMOUNT_MINOR: i64 = 10_000_000_000_000;

/// Largest count of one denomination in a drawer count.
pub const MAX_CASH_COUNT: i64 = 1_000_000;
