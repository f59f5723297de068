//! # Drawer Repository
//!
//! Cash drawer sessions and the cash movements attributed to them.
//!
//! The partial unique index `idx_drawer_sessions_one_active` keeps at most
//! one open or reconciling session per staff member even if two tills race
//! to open one.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::transaction::parse_currency;
use turnstile_core::{CashDrawerSession, CashMovement, CashMovementKind, DrawerStatus, Money};

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    staff_id: String,
    event_id: String,
    device_id: Option<String>,
    currency: String,
    opening_minor: i64,
    expected_minor: i64,
    current_minor: Option<i64>,
    status: DrawerStatus,
    cash_counts_json: String,
    notes: Option<String>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SessionRow> for CashDrawerSession {
    type Error = DbError;

    fn try_from(row: SessionRow) -> DbResult<Self> {
        let currency = parse_currency(&row.currency)?;
        Ok(CashDrawerSession {
            id: row.id,
            staff_id: row.staff_id,
            event_id: row.event_id,
            device_id: row.device_id,
            opening_balance: Money::new(row.opening_minor, currency),
            expected_balance: Money::new(row.expected_minor, currency),
            current_balance: row.current_minor.map(|m| Money::new(m, currency)),
            status: row.status,
            cash_counts: serde_json::from_str(&row.cash_counts_json)?,
            notes: row.notes,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: String,
    session_id: Option<String>,
    transaction_id: String,
    staff_id: String,
    kind: CashMovementKind,
    amount_minor: i64,
    currency: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for CashMovement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> DbResult<Self> {
        Ok(CashMovement {
            amount: Money::new(row.amount_minor, parse_currency(&row.currency)?),
            id: row.id,
            session_id: row.session_id,
            transaction_id: row.transaction_id,
            staff_id: row.staff_id,
            kind: row.kind,
            occurred_at: row.occurred_at,
        })
    }
}

// =============================================================================
// Writes (called inside Database::commit)
// =============================================================================

pub(crate) async fn insert_session(
    conn: &mut SqliteConnection,
    session: &CashDrawerSession,
) -> DbResult<()> {
    debug!(id = %session.id, staff_id = %session.staff_id, "Opening drawer session");

    sqlx::query(
        r#"
        INSERT INTO drawer_sessions (
            id, staff_id, event_id, device_id, currency, opening_minor,
            expected_minor, current_minor, status, cash_counts_json, notes,
            opened_at, closed_at, updated_at, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&session.id)
    .bind(&session.staff_id)
    .bind(&session.event_id)
    .bind(&session.device_id)
    .bind(session.opening_balance.currency().as_str())
    .bind(session.opening_balance.minor())
    .bind(session.expected_balance.minor())
    .bind(session.current_balance.map(|m| m.minor()))
    .bind(session.status)
    .bind(serde_json::to_string(&session.cash_counts)?)
    .bind(&session.notes)
    .bind(session.opened_at)
    .bind(session.closed_at)
    .bind(session.updated_at)
    .bind(session.version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Optimistic update; the stored version must be `session.version - 1`.
pub(crate) async fn update_session(
    conn: &mut SqliteConnection,
    session: &CashDrawerSession,
) -> DbResult<()> {
    let expected_version = session.version - 1;

    let result = sqlx::query(
        r#"
        UPDATE drawer_sessions SET
            expected_minor = ?1,
            current_minor = ?2,
            status = ?3,
            cash_counts_json = ?4,
            notes = ?5,
            closed_at = ?6,
            updated_at = ?7,
            version = ?8
        WHERE id = ?9 AND version = ?10
        "#,
    )
    .bind(session.expected_balance.minor())
    .bind(session.current_balance.map(|m| m.minor()))
    .bind(session.status)
    .bind(serde_json::to_string(&session.cash_counts)?)
    .bind(&session.notes)
    .bind(session.closed_at)
    .bind(session.updated_at)
    .bind(session.version)
    .bind(&session.id)
    .bind(expected_version)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::version_conflict(
            "Drawer session",
            &session.id,
            expected_version,
        ));
    }

    Ok(())
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    movement: &CashMovement,
) -> DbResult<()> {
    debug!(
        transaction_id = %movement.transaction_id,
        session_id = ?movement.session_id,
        amount = %movement.amount,
        "Recording cash movement"
    );

    sqlx::query(
        r#"
        INSERT INTO cash_movements (
            id, session_id, transaction_id, staff_id, kind, amount_minor,
            currency, occurred_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.session_id)
    .bind(&movement.transaction_id)
    .bind(&movement.staff_id)
    .bind(movement.kind)
    .bind(movement.amount.minor())
    .bind(movement.amount.currency().as_str())
    .bind(movement.occurred_at)
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to drawer sessions and cash movements.
#[derive(Debug, Clone)]
pub struct DrawerRepository {
    pool: SqlitePool,
}

impl DrawerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DrawerRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CashDrawerSession>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM drawer_sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CashDrawerSession::try_from).transpose()
    }

    /// Loads one session or fails with [`DbError::NotFound`].
    pub async fn get(&self, id: &str) -> DbResult<CashDrawerSession> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Drawer session", id))
    }

    /// The staff member's open or reconciling session, if any.
    pub async fn active_for_staff(&self, staff_id: &str) -> DbResult<Option<CashDrawerSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM drawer_sessions
            WHERE staff_id = ?1 AND status IN ('open', 'reconciling')
            "#,
        )
        .bind(staff_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CashDrawerSession::try_from).transpose()
    }

    /// Every session for an event, newest first.
    pub async fn list_by_event(&self, event_id: &str) -> DbResult<Vec<CashDrawerSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM drawer_sessions WHERE event_id = ?1 ORDER BY opened_at DESC, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CashDrawerSession::try_from).collect()
    }

    /// Movements applied to a session, oldest first.
    pub async fn movements_for_session(&self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT * FROM cash_movements WHERE session_id = ?1 ORDER BY occurred_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CashMovement::try_from).collect()
    }

    /// Movements for a transaction, including ones no drawer was open for.
    pub async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> DbResult<Vec<CashMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT * FROM cash_movements WHERE transaction_id = ?1 ORDER BY occurred_at, id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CashMovement::try_from).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::changeset::ChangeSet;
    use crate::{Database, DbConfig};
    use turnstile_core::drawer::{close_session, open_session, CloseDrawer, OpenDrawer};
    use turnstile_core::{CashCount, CurrencyCode, Settings};

    fn usd(minor: i64) -> Money {
        Money::new(minor, CurrencyCode::USD)
    }

    fn opened(staff_id: &str) -> CashDrawerSession {
        open_session(
            &Settings::default(),
            OpenDrawer {
                session_id: None,
                staff_id: staff_id.into(),
                event_id: "evt-1".into(),
                device_id: None,
                opening_balance: usd(10_000),
            },
            None,
            Utc::now(),
        )
        .unwrap()
        .session
    }

    #[tokio::test]
    async fn test_open_and_find_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = opened("staff-1");

        db.commit(ChangeSet::new().insert_session(session.clone()))
            .await
            .unwrap();

        let active = db.drawers().active_for_staff("staff-1").await.unwrap().unwrap();
        assert_eq!(active.id, session.id);
        assert_eq!(active.expected_balance, usd(10_000));
        assert!(db.drawers().active_for_staff("staff-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_active_session_is_rejected_by_index() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.commit(ChangeSet::new().insert_session(opened("staff-1")))
            .await
            .unwrap();
        let err = db
            .commit(ChangeSet::new().insert_session(opened("staff-1")))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_closed_session_frees_the_staff_member() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let session = opened("staff-1");
        db.commit(ChangeSet::new().insert_session(session.clone()))
            .await
            .unwrap();

        let closed = close_session(
            &session,
            CloseDrawer {
                counts: vec![CashCount::new(usd(2_000), 5)],
                notes: Some("  end of night ".into()),
            },
            Utc::now(),
        )
        .unwrap()
        .session;
        db.commit(ChangeSet::new().update_session(closed))
            .await
            .unwrap();

        let stored = db.drawers().get(&session.id).await.unwrap();
        assert_eq!(stored.status, DrawerStatus::Closed);
        assert_eq!(stored.current_balance, Some(usd(10_000)));
        assert_eq!(stored.cash_counts.len(), 1);
        assert_eq!(stored.notes.as_deref(), Some("end of night"));

        assert!(db.drawers().active_for_staff("staff-1").await.unwrap().is_none());
        db.commit(ChangeSet::new().insert_session(opened("staff-1")))
            .await
            .unwrap();
        assert_eq!(db.drawers().list_by_event("evt-1").await.unwrap().len(), 2);
    }
}
