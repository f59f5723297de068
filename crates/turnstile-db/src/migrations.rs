//! # Schema Migrations
//!
//! The ledger schema ships inside the binary; a terminal upgrades its own
//! database on start-up, before it accepts a sale.
//!
//! ## Upgrade Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new(config)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run_migrations(pool)                                                   │
//! │       │  sqlx bookkeeping table: _sqlx_migrations                       │
//! │       │                                                                 │
//! │       ├── 0001_initial_schema.sql   applied earlier → checksum verified │
//! │       └── 0002_*.sql                not yet applied → runs in its own   │
//! │                                     SQL transaction                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  migration_status(pool) → (embedded, applied), logged at start-up       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queued sync entries and drawer sessions from older builds must keep
//! loading, so schema changes are additive: a new numbered file, never an
//! edit to one that has shipped.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};

/// Every `migrations/sqlite/NNNN_*.sql` file, embedded at compile time.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Brings the schema up to date. A no-op on a current database.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (embedded, applied) = migration_status(pool).await?;
    if applied < embedded {
        info!(embedded, applied, "Applying schema migrations");
    }

    MIGRATOR.run(pool).await?;
    Ok(())
}

/// `(embedded, applied)` migration counts.
///
/// Only successful runs of migrations this build knows about count as
/// applied. A database that was never migrated reports zero applied; a
/// half-applied migration left by a crash is an error.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let has_table: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if !has_table {
        return Ok((embedded, 0));
    }

    let rows: Vec<(i64, bool)> = sqlx::query_as("SELECT version, success FROM _sqlx_migrations")
        .fetch_all(pool)
        .await?;

    if let Some((version, _)) = rows.iter().find(|(_, success)| !success) {
        warn!(version, "Found an incomplete schema migration");
        return Err(DbError::MigrationFailed(format!(
            "migration {} did not complete",
            version
        )));
    }

    let applied = rows
        .iter()
        .filter(|(version, _)| MIGRATOR.migrations.iter().any(|m| m.version == *version))
        .count();

    Ok((embedded, applied))
}
