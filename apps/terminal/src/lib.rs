//! # Turnstile Terminal Library
//!
//! The box-office terminal: state, commands and start-up.
//!
//! ## Module Organization
//! ```text
//! turnstile_terminal_lib/
//! ├── lib.rs          ◄─── You are here (Terminal setup & run)
//! ├── config.rs       ◄─── TOML + environment configuration
//! ├── error.rs        ◄─── API error type for commands
//! ├── state/
//! │   ├── db.rs           ◄─── Database wrapper
//! │   ├── settings.rs     ◄─── Settings provider + fraud screen
//! │   ├── locks.rs        ◄─── Per-entity mutation locks
//! │   ├── report_cache.rs ◄─── Daily report cache
//! │   └── sync.rs         ◄─── Sync worker handle
//! └── commands/
//!     ├── transaction.rs  ◄─── Sale lifecycle
//!     ├── drawer.rs       ◄─── Cash drawer sessions
//!     ├── report.rs       ◄─── Daily sales report
//!     ├── settings.rs     ◄─── Runtime settings
//!     └── sync.rs         ◄─── Sync status and control
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use turnstile_db::{Database, DbConfig};
use turnstile_sync::RemoteLedger;

use config::TerminalConfig;
use error::ApiResult;
use state::{DbState, EntityLocks, ReportCache, SettingsState, SyncState};

/// All long-lived state of a running terminal.
pub struct Terminal {
    pub device_id: String,
    pub db: DbState,
    pub settings: SettingsState,
    pub locks: EntityLocks,
    pub reports: ReportCache,
    pub sync: SyncState,
}

impl Terminal {
    /// Opens the database and starts sync as configured.
    ///
    /// ## Startup Sequence
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────────┐
    /// │  1. Resolve database path (config, TURNSTILE_DB_PATH or data dir)       │
    /// │  2. Connect: WAL, synchronous FULL, run pending migrations              │
    /// │  3. Build state: settings, locks, report cache                          │
    /// │  4. Start the sync worker, or stay offline without a remote URL         │
    /// │     (queued entries from a previous run are picked up either way)       │
    /// └─────────────────────────────────────────────────────────────────────────┘
    /// ```
    pub async fn start(config: TerminalConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_path = config.database_path()?;
        info!(?db_path, "Database path determined");

        let db = Database::new(
            DbConfig::new(db_path).max_connections(config.database.max_connections),
        )
        .await?;
        let (total, applied) = db.migration_status().await?;
        info!(total, applied, "Database connected and migrations applied");
        if !db.health_check().await {
            warn!("Database health check failed after connect");
        }

        let sync = SyncState::start(db.clone(), config.sync.clone(), &config.device.id)?;
        let terminal = Terminal::assemble(config, db, sync);

        let status = terminal.sync.status().await?;
        info!(
            device_id = %terminal.device_id,
            pending = status.pending,
            failed = status.failed,
            "Terminal ready"
        );
        Ok(terminal)
    }

    /// A terminal on an existing database with no remote configured.
    pub fn offline(config: TerminalConfig, db: Database) -> Self {
        let sync = SyncState::offline(db.clone());
        Terminal::assemble(config, db, sync)
    }

    /// A terminal delivering to the given remote ledger.
    pub fn with_remote(
        config: TerminalConfig,
        db: Database,
        remote: Arc<dyn RemoteLedger>,
    ) -> Self {
        let sync = SyncState::with_remote(db.clone(), remote, config.sync.clone(), &config.device.id);
        Terminal::assemble(config, db, sync)
    }

    fn assemble(config: TerminalConfig, db: Database, sync: SyncState) -> Self {
        Terminal {
            device_id: config.device.id,
            db: DbState::new(db),
            settings: SettingsState::new(config.settings),
            locks: EntityLocks::new(),
            reports: ReportCache::new(Duration::from_secs(config.reports.cache_ttl_secs)),
            sync,
        }
    }

    /// Stops the sync worker and closes the pool.
    pub async fn shutdown(&self) -> ApiResult<()> {
        self.sync.shutdown().await?;
        self.db.inner().close().await;
        info!("Terminal stopped");
        Ok(())
    }
}

/// Runs the terminal headless until Ctrl-C.
///
/// The first command-line argument, if any, is the config file path.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!("Starting Turnstile terminal");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TerminalConfig::load(config_path)?;
    let terminal = Terminal::start(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    if let Err(e) = terminal.shutdown().await {
        error!(error = %e, "Shutdown did not complete cleanly");
    }
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=turnstile=trace` - Show trace for turnstile crates only
/// - Default: INFO, DEBUG for turnstile crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,turnstile=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use turnstile_core::ledger::{LineItemInput, NewTransaction, Tender};
    use turnstile_core::{CurrencyCode, Money};

    pub async fn terminal() -> Terminal {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Terminal::offline(TerminalConfig::default(), db)
    }

    pub fn usd(minor: i64) -> Money {
        Money::new(minor, CurrencyCode::USD)
    }

    pub fn cash(minor: i64) -> Tender {
        Tender::Cash {
            amount_tendered: usd(minor),
        }
    }

    pub fn line(id: &str, unit_minor: i64, quantity: i64) -> LineItemInput {
        LineItemInput {
            id: id.into(),
            name: format!("Ticket {}", id),
            quantity,
            unit_price: usd(unit_minor),
            tax_rate_bps: None,
            category: Some("admission".into()),
        }
    }

    pub fn new_sale(items: Vec<LineItemInput>) -> NewTransaction {
        NewTransaction {
            id: None,
            event_id: "evt-1".into(),
            staff_id: "staff-1".into(),
            device_id: Some("dev-1".into()),
            customer: None,
            items,
            discount: None,
        }
    }
}
