//! Office-wide delegation switch backed by a single `delegation_settings` row.
//!
//! When enabled, staff accounts may act on the two approval permissions the
//! engine carves out for them. The switch is global: there is exactly one row
//! (id = 1) and flipping it affects every staff session at once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::utils::utc_now;

/// Current state of the switch plus who last touched it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DelegationSetting {
    pub staff_can_approve: bool,
    pub enabled_by: Option<String>,
    pub enabled_at: Option<DateTime<Utc>>,
}

/// Outcome of one toggle, shaped for audit trail snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationChange {
    pub before: bool,
    pub after: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DelegationGate;

impl DelegationGate {
    pub fn new() -> Self {
        Self
    }

    /// Read the switch without creating the row. A missing row reads as
    /// disabled, which keeps the hot authorization path write-free.
    pub async fn is_enabled(&self, pool: &SqlitePool) -> AppResult<bool> {
        let enabled: Option<bool> =
            sqlx::query_scalar("SELECT staff_can_approve FROM delegation_settings WHERE id = 1")
                .fetch_optional(pool)
                .await?;
        Ok(enabled.unwrap_or(false))
    }

    /// Fetch the full setting, creating the disabled singleton row on first
    /// touch so later toggles have something to update.
    pub async fn current(&self, pool: &SqlitePool) -> AppResult<DelegationSetting> {
        let mut conn = pool.acquire().await?;
        self.current_in(&mut conn).await
    }

    pub async fn current_in(&self, conn: &mut SqliteConnection) -> AppResult<DelegationSetting> {
        sqlx::query(
            "INSERT INTO delegation_settings (id, staff_can_approve) VALUES (1, 0)
             ON CONFLICT(id) DO NOTHING",
        )
        .execute(&mut *conn)
        .await?;

        let (staff_can_approve, enabled_by, enabled_at): (bool, Option<String>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                "SELECT staff_can_approve, enabled_by, enabled_at FROM delegation_settings WHERE id = 1",
            )
            .fetch_one(&mut *conn)
            .await?;

        Ok(DelegationSetting {
            staff_can_approve,
            enabled_by,
            enabled_at,
        })
    }

    /// Flip the switch, recording who did it and when.
    pub async fn toggle(
        &self,
        conn: &mut SqliteConnection,
        actor: Uuid,
    ) -> AppResult<DelegationChange> {
        let before = self.current_in(conn).await?.staff_can_approve;
        let after = !before;

        sqlx::query(
            "UPDATE delegation_settings SET staff_can_approve = ?, enabled_by = ?, enabled_at = ?
             WHERE id = 1",
        )
        .bind(after)
        .bind(actor.to_string())
        .bind(utc_now())
        .execute(&mut *conn)
        .await?;

        Ok(DelegationChange { before, after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn switch_starts_disabled() {
        let pool = test_pool().await;
        let gate = DelegationGate::new();

        assert!(!gate.is_enabled(&pool).await.unwrap());
        let setting = gate.current(&pool).await.unwrap();
        assert!(!setting.staff_can_approve);
        assert!(setting.enabled_by.is_none());
    }

    #[tokio::test]
    async fn toggle_flips_and_records_the_actor() {
        let pool = test_pool().await;
        let gate = DelegationGate::new();
        let actor = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        let change = gate.toggle(&mut conn, actor).await.unwrap();
        drop(conn);

        assert_eq!(change, DelegationChange { before: false, after: true });
        assert!(gate.is_enabled(&pool).await.unwrap());

        let setting = gate.current(&pool).await.unwrap();
        assert_eq!(setting.enabled_by.as_deref(), Some(actor.to_string().as_str()));
        assert!(setting.enabled_at.is_some());

        let mut conn = pool.acquire().await.unwrap();
        let change = gate.toggle(&mut conn, actor).await.unwrap();
        drop(conn);
        assert_eq!(change, DelegationChange { before: true, after: false });
        assert!(!gate.is_enabled(&pool).await.unwrap());
    }
}
