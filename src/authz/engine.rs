//! Authorization core: one decision function consulted before every
//! privileged operation.
//!
//! The engine itself has no side effects beyond log lines. It never writes
//! audit entries; whoever performs the guarded mutation is responsible for
//! recording it.

use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::authz::catalog::PermissionCatalog;
use crate::authz::delegation::DelegationGate;
use crate::authz::store::OverrideStore;
use crate::authz::{permissions, roles, Principal};
use crate::errors::{AppError, AppResult};

/// The two approval actions staff accounts pick up while delegation is on.
/// Deliberately hardcoded; widening this list is a policy change, not a
/// configuration tweak.
const DELEGATED_PERMISSIONS: [&str; 2] = [
    permissions::CERTIFICATES_APPROVE,
    permissions::BLOTTER_APPROVE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// No authenticated user on the request.
    NoUser,
    /// Role resolves to nothing in the catalog and has no override row.
    UnknownRole(String),
    PermissionDenied(String),
}

#[derive(Clone)]
pub struct AccessEngine {
    pool: SqlitePool,
    catalog: Arc<PermissionCatalog>,
    store: OverrideStore,
    gate: DelegationGate,
}

impl AccessEngine {
    pub fn new(pool: SqlitePool, catalog: Arc<PermissionCatalog>) -> Self {
        let store = OverrideStore::new(catalog.clone());
        Self {
            pool,
            catalog,
            store,
            gate: DelegationGate::new(),
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &OverrideStore {
        &self.store
    }

    pub fn gate(&self) -> &DelegationGate {
        &self.gate
    }

    /// Decide whether `user` may exercise `permission`.
    ///
    /// Resolution order: authentication, role canonicalization, effective
    /// permission set (override row with catalog fallback), then the staff
    /// delegation escape hatch. Every check re-reads the database; an admin
    /// edit is live on the next request.
    pub async fn authorize(
        &self,
        user: Option<&Principal>,
        permission: &str,
    ) -> AppResult<Decision> {
        let Some(principal) = user else {
            tracing::debug!(permission, "access denied, no authenticated user");
            return Ok(Decision::Deny(DenyReason::NoUser));
        };

        let canonical = self.catalog.canonical_role(&principal.role);
        let granted = match self.resolve_permissions(&canonical).await? {
            Some(set) => set,
            None => {
                tracing::warn!(
                    user_id = %principal.user_id,
                    role = %principal.role,
                    "role missing from catalog and override store, denying"
                );
                return Ok(Decision::Deny(DenyReason::UnknownRole(canonical)));
            }
        };

        if granted.contains(permission) {
            tracing::debug!(
                user_id = %principal.user_id,
                role = %canonical,
                permission,
                "access allowed by effective permissions"
            );
            return Ok(Decision::Allow);
        }

        if DELEGATED_PERMISSIONS.contains(&permission)
            && canonical == roles::STAFF_USER
            && self.gate.is_enabled(&self.pool).await?
        {
            tracing::debug!(
                user_id = %principal.user_id,
                permission,
                "access allowed by staff delegation"
            );
            return Ok(Decision::Allow);
        }

        tracing::debug!(
            user_id = %principal.user_id,
            role = %canonical,
            permission,
            "access denied, permission not granted"
        );
        Ok(Decision::Deny(DenyReason::PermissionDenied(
            permission.to_string(),
        )))
    }

    /// Effective permission set for the principal's role, delegation grants
    /// excluded. Roles unknown to both the catalog and the override store
    /// resolve to the empty set.
    pub async fn effective_for(&self, principal: &Principal) -> AppResult<BTreeSet<String>> {
        let canonical = self.catalog.canonical_role(&principal.role);
        Ok(self
            .resolve_permissions(&canonical)
            .await?
            .unwrap_or_default())
    }

    async fn resolve_permissions(&self, canonical: &str) -> AppResult<Option<BTreeSet<String>>> {
        if self.catalog.is_known(canonical) {
            let set = self
                .store
                .effective_permissions(&self.pool, canonical)
                .await?;
            return Ok(Some(set));
        }
        let stored = self.store.stored(&self.pool, canonical).await?;
        Ok(stored.map(|row| row.permissions))
    }

    /// Handler guard: turns a deny into the transport error. The forbidden
    /// message stays generic so callers learn nothing about other roles.
    pub async fn require(&self, principal: &Principal, permission: &str) -> AppResult<()> {
        match self.authorize(Some(principal), permission).await? {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::NoUser) => {
                Err(AppError::unauthorized("authentication required"))
            }
            Decision::Deny(_) => Err(AppError::forbidden("insufficient permission")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use uuid::Uuid;

    fn catalog() -> Arc<PermissionCatalog> {
        Arc::new(
            PermissionCatalog::from_json(
                r#"{
                    "version": 1,
                    "roles": {
                        "staff_user": ["blotter.view", "blotter.create"],
                        "records_officer": ["blotter.view", "blotter.approve", "certificates.approve"],
                        "finance_officer": ["finance.payment.view"]
                    },
                    "aliases": {"encoder": "staff_user"}
                }"#,
            )
            .unwrap(),
        )
    }

    async fn engine() -> AccessEngine {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        AccessEngine::new(pool, catalog())
    }

    fn principal(role: &str) -> Principal {
        Principal::new(Uuid::new_v4(), role)
    }

    #[tokio::test]
    async fn unauthenticated_requests_are_denied() {
        let engine = engine().await;
        let decision = engine.authorize(None, "blotter.view").await.unwrap();
        assert_eq!(decision, Decision::Deny(DenyReason::NoUser));
    }

    #[tokio::test]
    async fn defaults_grant_and_withhold() {
        let engine = engine().await;
        let staff = principal("staff_user");

        assert!(engine
            .authorize(Some(&staff), "blotter.view")
            .await
            .unwrap()
            .is_allow());
        assert_eq!(
            engine.authorize(Some(&staff), "blotter.approve").await.unwrap(),
            Decision::Deny(DenyReason::PermissionDenied("blotter.approve".into()))
        );
    }

    #[tokio::test]
    async fn alias_roles_resolve_before_lookup() {
        let engine = engine().await;
        let legacy = principal("ENCODER");
        assert!(engine
            .authorize(Some(&legacy), "blotter.view")
            .await
            .unwrap()
            .is_allow());
    }

    #[tokio::test]
    async fn override_supersedes_defaults() {
        let engine = engine().await;
        let staff = principal("staff_user");

        let mut conn = engine.pool.acquire().await.unwrap();
        engine
            .store()
            .set_override(
                &mut conn,
                "staff_user",
                &["blotter.view".to_string()],
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        drop(conn);

        // blotter.create was a default grant; the override removed it
        assert_eq!(
            engine.authorize(Some(&staff), "blotter.create").await.unwrap(),
            Decision::Deny(DenyReason::PermissionDenied("blotter.create".into()))
        );
        assert!(engine
            .authorize(Some(&staff), "blotter.view")
            .await
            .unwrap()
            .is_allow());
    }

    #[tokio::test]
    async fn unknown_role_without_override_fails_closed() {
        let engine = engine().await;
        let stray = principal("mayor");
        assert_eq!(
            engine.authorize(Some(&stray), "blotter.view").await.unwrap(),
            Decision::Deny(DenyReason::UnknownRole("mayor".into()))
        );
    }

    #[tokio::test]
    async fn unknown_role_with_override_row_is_honored() {
        let engine = engine().await;
        let stray = principal("consultant");

        let mut conn = engine.pool.acquire().await.unwrap();
        engine
            .store()
            .set_override(
                &mut conn,
                "consultant",
                &["blotter.view".to_string()],
                Uuid::new_v4(),
            )
            .await
            .unwrap();
        drop(conn);

        assert!(engine
            .authorize(Some(&stray), "blotter.view")
            .await
            .unwrap()
            .is_allow());
        assert_eq!(
            engine.authorize(Some(&stray), "blotter.create").await.unwrap(),
            Decision::Deny(DenyReason::PermissionDenied("blotter.create".into()))
        );
    }

    #[tokio::test]
    async fn delegation_grants_staff_the_two_approvals_only() {
        let engine = engine().await;
        let staff = principal("staff_user");

        assert!(!engine
            .authorize(Some(&staff), "certificates.approve")
            .await
            .unwrap()
            .is_allow());

        let mut conn = engine.pool.acquire().await.unwrap();
        engine.gate().toggle(&mut conn, Uuid::new_v4()).await.unwrap();
        drop(conn);

        assert!(engine
            .authorize(Some(&staff), "certificates.approve")
            .await
            .unwrap()
            .is_allow());
        assert!(engine
            .authorize(Some(&staff), "blotter.approve")
            .await
            .unwrap()
            .is_allow());
        // everything outside the hardcoded pair stays governed by the sets
        assert!(!engine
            .authorize(Some(&staff), "residents.view")
            .await
            .unwrap()
            .is_allow());

        let mut conn = engine.pool.acquire().await.unwrap();
        engine.gate().toggle(&mut conn, Uuid::new_v4()).await.unwrap();
        drop(conn);

        assert!(!engine
            .authorize(Some(&staff), "certificates.approve")
            .await
            .unwrap()
            .is_allow());
    }

    #[tokio::test]
    async fn delegation_never_applies_to_other_roles() {
        let engine = engine().await;
        let finance = principal("finance_officer");

        let mut conn = engine.pool.acquire().await.unwrap();
        engine.gate().toggle(&mut conn, Uuid::new_v4()).await.unwrap();
        drop(conn);

        assert!(!engine
            .authorize(Some(&finance), "certificates.approve")
            .await
            .unwrap()
            .is_allow());
    }

    #[tokio::test]
    async fn require_maps_denials_to_forbidden() {
        let engine = engine().await;
        let staff = principal("staff_user");

        engine.require(&staff, "blotter.view").await.unwrap();
        let err = engine.require(&staff, "blotter.approve").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
