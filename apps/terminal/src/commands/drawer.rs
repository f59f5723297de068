//! # Cash Drawer Commands
//!
//! Open, count and close a staff member's drawer.
//!
//! ```text
//! open_drawer_session ──► Open ──► begin_drawer_count ──► Reconciling ──► close_drawer_session ──► Closed
//!                          │                                                  ▲
//!                          └──────────────────────────────────────────────────┘
//! ```
//!
//! Every command holds the staff member's drawer lock, so a cash sale can
//! never land between the read and the commit of a close.

use chrono::Utc;
use tracing::{debug, info, warn};

use turnstile_core::drawer::{self, CloseDrawer, OpenDrawer};
use turnstile_core::{BalanceStatus, CashDrawerSession, CashMovement, DrawerCloseSummary};
use turnstile_db::ChangeSet;

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, EntityLocks, SettingsState};

/// Opens a session for a staff member with no active drawer.
pub async fn open_drawer_session(
    db: &DbState,
    settings: &SettingsState,
    locks: &EntityLocks,
    input: OpenDrawer,
) -> ApiResult<CashDrawerSession> {
    debug!(staff_id = %input.staff_id, "open_drawer_session command");
    let _guard = locks.drawer(&input.staff_id).await;

    let active = db.inner().drawers().active_for_staff(&input.staff_id).await?;
    let outcome = drawer::open_session(&settings.current(), input, active.as_ref(), Utc::now())?;
    let session = outcome.session.clone();

    db.inner()
        .commit(
            ChangeSet::new()
                .insert_session(outcome.session)
                .enqueue(outcome.sync),
        )
        .await?;

    info!(
        session_id = %session.id,
        staff_id = %session.staff_id,
        opening_balance = %session.opening_balance,
        "Drawer opened"
    );
    Ok(session)
}

/// Moves an open session to counting.
pub async fn begin_drawer_count(
    db: &DbState,
    locks: &EntityLocks,
    session_id: &str,
) -> ApiResult<CashDrawerSession> {
    debug!(session_id, "begin_drawer_count command");
    let staff_id = db.inner().drawers().get(session_id).await?.staff_id;
    let _guard = locks.drawer(&staff_id).await;

    let current = db.inner().drawers().get(session_id).await?;
    let updated = drawer::begin_count(&current, Utc::now())?;
    db.inner()
        .commit(ChangeSet::new().update_session(updated.clone()))
        .await?;

    Ok(updated)
}

/// Closes a session from a physical count and reports the variance.
pub async fn close_drawer_session(
    db: &DbState,
    locks: &EntityLocks,
    session_id: &str,
    input: CloseDrawer,
) -> ApiResult<DrawerCloseSummary> {
    debug!(session_id, lines = input.counts.len(), "close_drawer_session command");
    let staff_id = db.inner().drawers().get(session_id).await?.staff_id;
    let _guard = locks.drawer(&staff_id).await;

    let current = db.inner().drawers().get(session_id).await?;
    let outcome = drawer::close_session(&current, input, Utc::now())?;
    let summary = DrawerCloseSummary::from_session(&outcome.session)
        .ok_or_else(|| ApiError::internal("Closed session has no counted balance"))?;

    db.inner()
        .commit(
            ChangeSet::new()
                .update_session(outcome.session)
                .enqueue(outcome.sync),
        )
        .await?;

    match summary.balance {
        BalanceStatus::Balanced => info!(
            session_id,
            counted = %summary.counted,
            "Drawer closed balanced"
        ),
        BalanceStatus::Over | BalanceStatus::Short => warn!(
            session_id,
            expected = %summary.expected,
            counted = %summary.counted,
            variance = %summary.variance,
            "Drawer closed with variance"
        ),
    }
    Ok(summary)
}

/// The staff member's open or counting session, if any.
pub async fn current_drawer_session(
    db: &DbState,
    staff_id: &str,
) -> ApiResult<Option<CashDrawerSession>> {
    Ok(db.inner().drawers().active_for_staff(staff_id).await?)
}

pub async fn get_drawer_session(db: &DbState, session_id: &str) -> ApiResult<CashDrawerSession> {
    Ok(db.inner().drawers().get(session_id).await?)
}

/// Every session of an event, newest first.
pub async fn list_drawer_sessions(
    db: &DbState,
    event_id: &str,
) -> ApiResult<Vec<CashDrawerSession>> {
    Ok(db.inner().drawers().list_by_event(event_id).await?)
}

/// Cash sales and refunds applied to a session.
pub async fn drawer_movements(db: &DbState, session_id: &str) -> ApiResult<Vec<CashMovement>> {
    // Surface NOT_FOUND rather than an empty list for an unknown session.
    db.inner().drawers().get(session_id).await?;
    Ok(db.inner().drawers().movements_for_session(session_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::test_support::{terminal, usd};
    use turnstile_core::{CashCount, DrawerStatus};

    fn open_input(staff_id: &str, minor: i64) -> OpenDrawer {
        OpenDrawer {
            session_id: None,
            staff_id: staff_id.into(),
            event_id: "evt-1".into(),
            device_id: Some("dev-1".into()),
            opening_balance: usd(minor),
        }
    }

    #[tokio::test]
    async fn test_one_active_session_per_staff() {
        let t = terminal().await;
        let session = open_drawer_session(&t.db, &t.settings, &t.locks, open_input("staff-1", 10_000))
            .await
            .unwrap();
        assert_eq!(session.status, DrawerStatus::Open);
        assert_eq!(session.expected_balance, usd(10_000));

        let err = open_drawer_session(&t.db, &t.settings, &t.locks, open_input("staff-1", 5_000))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);

        // Another staff member is unaffected.
        open_drawer_session(&t.db, &t.settings, &t.locks, open_input("staff-2", 5_000))
            .await
            .unwrap();

        let current = current_drawer_session(&t.db, "staff-1").await.unwrap();
        assert_eq!(current.map(|s| s.id), Some(session.id));
    }

    #[tokio::test]
    async fn test_count_then_close_balanced() {
        let t = terminal().await;
        let session = open_drawer_session(&t.db, &t.settings, &t.locks, open_input("staff-1", 5_000))
            .await
            .unwrap();

        let counting = begin_drawer_count(&t.db, &t.locks, &session.id).await.unwrap();
        assert_eq!(counting.status, DrawerStatus::Reconciling);

        let err = begin_drawer_count(&t.db, &t.locks, &session.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);

        let summary = close_drawer_session(
            &t.db,
            &t.locks,
            &session.id,
            CloseDrawer {
                counts: vec![CashCount::new(usd(2_000), 2), CashCount::new(usd(500), 2)],
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(summary.balance, BalanceStatus::Balanced);
        assert!(summary.variance.is_zero());
        assert_eq!(summary.session.status, DrawerStatus::Closed);

        assert!(current_drawer_session(&t.db, "staff-1").await.unwrap().is_none());

        let err = close_drawer_session(
            &t.db,
            &t.locks,
            &session.id,
            CloseDrawer {
                counts: vec![CashCount::new(usd(5_000), 1)],
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::StateConflict);
    }

    #[tokio::test]
    async fn test_bad_count_is_rejected_and_session_stays_open() {
        let t = terminal().await;
        let session = open_drawer_session(&t.db, &t.settings, &t.locks, open_input("staff-1", 5_000))
            .await
            .unwrap();

        let err = close_drawer_session(
            &t.db,
            &t.locks,
            &session.id,
            CloseDrawer {
                counts: vec![CashCount::new(usd(2_000), -1)],
                notes: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let stored = get_drawer_session(&t.db, &session.id).await.unwrap();
        assert_eq!(stored.status, DrawerStatus::Open);
        assert!(drawer_movements(&t.db, &session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let t = terminal().await;
        let err = begin_drawer_count(&t.db, &t.locks, "drw-missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = drawer_movements(&t.db, "drw-missing").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
