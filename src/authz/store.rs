//! Per-role permission overrides stored in `role_permission_overrides`.
//!
//! A stored row supersedes the catalog defaults for that role entirely; it is
//! never merged with them. Reads always go to the database so an admin edit
//! takes effect on the very next request, with no cache layer to invalidate.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::catalog::PermissionCatalog;
use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

/// Snapshot of one override mutation, used for audit trail payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideChange {
    pub role: String,
    pub before: BTreeSet<String>,
    pub after: BTreeSet<String>,
}

impl OverrideChange {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Raw override row as persisted, JSON already decoded.
#[derive(Debug, Clone)]
pub struct StoredOverride {
    pub role: String,
    pub permissions: BTreeSet<String>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OverrideStore {
    catalog: Arc<PermissionCatalog>,
}

impl OverrideStore {
    pub fn new(catalog: Arc<PermissionCatalog>) -> Self {
        Self { catalog }
    }

    /// Effective permission set for a role: the stored override when one
    /// exists, the catalog defaults otherwise.
    pub async fn effective_permissions(
        &self,
        pool: &SqlitePool,
        role: &str,
    ) -> AppResult<BTreeSet<String>> {
        let mut conn = pool.acquire().await?;
        self.effective_in(&mut conn, role).await
    }

    /// Same as [`effective_permissions`](Self::effective_permissions) but
    /// usable inside an open transaction.
    pub async fn effective_in(
        &self,
        conn: &mut SqliteConnection,
        role: &str,
    ) -> AppResult<BTreeSet<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT permissions FROM role_permission_overrides WHERE role = ?")
                .bind(role)
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some((json,)) => decode_permissions(role, &json),
            None => Ok(self.catalog.defaults_for(role)),
        }
    }

    /// Stored override row with its bookkeeping columns, if any.
    pub async fn stored(&self, pool: &SqlitePool, role: &str) -> AppResult<Option<StoredOverride>> {
        let row: Option<(String, String, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT role, permissions, updated_by, updated_at
             FROM role_permission_overrides WHERE role = ?",
        )
        .bind(role)
        .fetch_optional(pool)
        .await?;

        match row {
            Some((role, json, updated_by, updated_at)) => {
                let permissions = decode_permissions(&role, &json)?;
                Ok(Some(StoredOverride {
                    role,
                    permissions,
                    updated_by,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Replace the role's permission set. Every requested token must exist in
    /// the catalog universe; offenders are rejected as a batch with the full
    /// list so the caller can surface them all at once.
    pub async fn set_override(
        &self,
        conn: &mut SqliteConnection,
        role: &str,
        requested: &[String],
        actor: Uuid,
    ) -> AppResult<OverrideChange> {
        let mut after = BTreeSet::new();
        let mut offenders = BTreeSet::new();
        for token in requested {
            let token = token.trim().to_ascii_lowercase();
            if token.is_empty() {
                continue;
            }
            if self.catalog.all_permissions().contains(&token) {
                after.insert(token);
            } else {
                offenders.insert(token);
            }
        }
        if !offenders.is_empty() {
            return Err(AppError::invalid_permissions(offenders));
        }

        let before = self.effective_in(conn, role).await?;
        self.upsert(conn, role, &after, actor).await?;

        Ok(OverrideChange {
            role: role.to_string(),
            before,
            after,
        })
    }

    /// Pin the role back to its current catalog defaults. The defaults come
    /// from the catalog itself, so no validation pass runs here.
    pub async fn reset_override(
        &self,
        conn: &mut SqliteConnection,
        role: &str,
        actor: Uuid,
    ) -> AppResult<OverrideChange> {
        let before = self.effective_in(conn, role).await?;
        let after = self.catalog.defaults_for(role);
        self.upsert(conn, role, &after, actor).await?;

        Ok(OverrideChange {
            role: role.to_string(),
            before,
            after,
        })
    }

    /// Reset every catalog role in one sweep. Roles outside the catalog keep
    /// their override rows; they have no defaults to return to.
    pub async fn reset_all(
        &self,
        conn: &mut SqliteConnection,
        actor: Uuid,
    ) -> AppResult<Vec<OverrideChange>> {
        let roles: Vec<String> = self.catalog.roles().map(str::to_string).collect();
        let mut changes = Vec::with_capacity(roles.len());
        for role in roles {
            changes.push(self.reset_override(conn, &role, actor).await?);
        }
        Ok(changes)
    }

    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        role: &str,
        permissions: &BTreeSet<String>,
        actor: Uuid,
    ) -> AppResult<()> {
        let json = serde_json::to_string(&permissions.iter().collect::<Vec<_>>())
            .map_err(|err| AppError::internal(format!("encode override: {err}")))?;

        sqlx::query(
            "INSERT INTO role_permission_overrides (role, permissions, updated_by, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(role) DO UPDATE SET
                 permissions = excluded.permissions,
                 updated_by = excluded.updated_by,
                 updated_at = excluded.updated_at",
        )
        .bind(role)
        .bind(&json)
        .bind(actor.to_string())
        .bind(utc_now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn decode_permissions(role: &str, json: &str) -> AppResult<BTreeSet<String>> {
    serde_json::from_str::<BTreeSet<String>>(json)
        .map_err(|err| AppError::internal(format!("override row for {role} holds bad JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn catalog() -> Arc<PermissionCatalog> {
        Arc::new(
            PermissionCatalog::from_json(
                r#"{
                    "version": 1,
                    "roles": {
                        "clerk": ["records.view", "records.create"],
                        "auditor": ["records.view"]
                    }
                }"#,
            )
            .unwrap(),
        )
    }

    async fn test_pool() -> SqlitePool {
        // in-memory sqlite is per-connection, so the pool must stay at one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    fn set(tokens: &[&str]) -> BTreeSet<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn defaults_apply_until_an_override_lands() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());

        let effective = store.effective_permissions(&pool, "clerk").await.unwrap();
        assert_eq!(effective, set(&["records.create", "records.view"]));

        let mut conn = pool.acquire().await.unwrap();
        let change = store
            .set_override(&mut conn, "clerk", &["records.view".to_string()], Uuid::new_v4())
            .await
            .unwrap();
        drop(conn);

        assert!(change.changed());
        assert_eq!(change.before, set(&["records.create", "records.view"]));
        assert_eq!(change.after, set(&["records.view"]));

        let effective = store.effective_permissions(&pool, "clerk").await.unwrap();
        assert_eq!(effective, set(&["records.view"]));
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected_as_a_batch() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());

        let mut conn = pool.acquire().await.unwrap();
        let requested = vec![
            "records.view".to_string(),
            "records.fly".to_string(),
            "records.teleport".to_string(),
        ];
        let err = store
            .set_override(&mut conn, "clerk", &requested, Uuid::new_v4())
            .await
            .unwrap_err();
        drop(conn);

        match err {
            AppError::InvalidPermissions(offenders) => {
                assert_eq!(offenders, vec!["records.fly", "records.teleport"]);
            }
            other => panic!("expected InvalidPermissions, got {other:?}"),
        }

        // the failed write must leave defaults untouched
        let effective = store.effective_permissions(&pool, "clerk").await.unwrap();
        assert_eq!(effective, set(&["records.create", "records.view"]));
    }

    #[tokio::test]
    async fn reset_returns_the_role_to_catalog_defaults() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());
        let actor = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(&mut conn, "auditor", &[], actor)
            .await
            .unwrap();
        let change = store.reset_override(&mut conn, "auditor", actor).await.unwrap();
        drop(conn);

        assert_eq!(change.before, BTreeSet::new());
        assert_eq!(change.after, set(&["records.view"]));
        assert_eq!(
            store.effective_permissions(&pool, "auditor").await.unwrap(),
            set(&["records.view"])
        );
    }

    #[tokio::test]
    async fn override_rows_for_roles_outside_the_catalog_are_honored() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(
                &mut conn,
                "consultant",
                &["records.view".to_string()],
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        drop(conn);

        assert_eq!(
            store
                .effective_permissions(&pool, "consultant")
                .await
                .unwrap(),
            set(&["records.view"])
        );
    }

    #[tokio::test]
    async fn last_write_wins_with_no_cache_in_between() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());
        let actor = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(&mut conn, "clerk", &["records.view".to_string()], actor)
            .await
            .unwrap();
        drop(conn);
        assert_eq!(
            store.effective_permissions(&pool, "clerk").await.unwrap(),
            set(&["records.view"])
        );

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(&mut conn, "clerk", &["records.create".to_string()], actor)
            .await
            .unwrap();
        drop(conn);
        assert_eq!(
            store.effective_permissions(&pool, "clerk").await.unwrap(),
            set(&["records.create"])
        );
    }

    #[tokio::test]
    async fn reset_all_sweeps_every_catalog_role() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());
        let actor = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(&mut conn, "clerk", &[], actor)
            .await
            .unwrap();
        store
            .set_override(&mut conn, "auditor", &[], actor)
            .await
            .unwrap();
        let changes = store.reset_all(&mut conn, actor).await.unwrap();
        drop(conn);

        assert_eq!(changes.len(), 2);
        assert_eq!(
            store.effective_permissions(&pool, "clerk").await.unwrap(),
            set(&["records.create", "records.view"])
        );
        assert_eq!(
            store.effective_permissions(&pool, "auditor").await.unwrap(),
            set(&["records.view"])
        );
    }

    #[tokio::test]
    async fn stored_row_carries_bookkeeping() {
        let pool = test_pool().await;
        let store = OverrideStore::new(catalog());
        let actor = Uuid::new_v4();

        assert!(store.stored(&pool, "clerk").await.unwrap().is_none());

        let mut conn = pool.acquire().await.unwrap();
        store
            .set_override(&mut conn, "clerk", &["records.view".to_string()], actor)
            .await
            .unwrap();
        drop(conn);

        let row = store.stored(&pool, "clerk").await.unwrap().unwrap();
        assert_eq!(row.role, "clerk");
        assert_eq!(row.permissions, set(&["records.view"]));
        assert_eq!(row.updated_by.as_deref(), Some(actor.to_string().as_str()));
    }
}
