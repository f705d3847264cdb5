//! Role permission administration.
//!
//! Reads show the default and effective sets side by side; writes replace a
//! role's effective set wholesale or pin it back to the catalog defaults.
//! Every write lands an audit entry in the same transaction.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::audit::{AuditEvent, RequestContext};
use crate::authz::labels;
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentUser;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_role_permissions))
        .route("/reset-all", post(reset_all_role_permissions))
        .route("/:role", put(update_role_permissions))
        .route("/:role/reset", post(reset_role_permissions))
}

// =============================================================================
// DTOS
// =============================================================================

/// One catalog role with its default and effective sets plus the diff an
/// override introduced. `overridden` is true whenever a database row exists,
/// even if that row matches the defaults exactly.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RolePermissionsEntry {
    #[schema(example = "finance_officer")]
    pub role: String,
    #[schema(example = "Finance Officer")]
    pub label: String,
    pub defaults: Vec<String>,
    pub effective: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub overridden: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRolePermissionsRequest {
    #[schema(example = json!(["finance.payment.view", "finance.payment.export"]))]
    pub permissions: Vec<String>,
}

// =============================================================================
// HANDLERS
// =============================================================================

#[utoipa::path(
    get,
    path = "/admin/role-permissions",
    tag = "RBAC Admin",
    responses((status = 200, description = "Default vs effective permissions per role", body = Vec<RolePermissionsEntry>)),
    security(("bearerAuth" = []))
)]
pub async fn list_role_permissions(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<Vec<RolePermissionsEntry>>> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_VIEW)
        .await?;

    Ok(Json(all_entries(&state).await?))
}

#[utoipa::path(
    put,
    path = "/admin/role-permissions/{role}",
    tag = "RBAC Admin",
    params(("role" = String, Path, description = "Role name or historical alias")),
    request_body = UpdateRolePermissionsRequest,
    responses(
        (status = 200, description = "Override stored", body = RolePermissionsEntry),
        (status = 404, description = "Unknown role"),
        (status = 422, description = "Request contains permissions outside the catalog")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role_permissions(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(role): Path<String>,
    Json(payload): Json<UpdateRolePermissionsRequest>,
) -> AppResult<Json<RolePermissionsEntry>> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_MANAGE)
        .await?;
    let canonical = canonical_known_role(&state, &role)?;

    let mut tx = state.pool.begin().await?;
    let change = state
        .engine
        .store()
        .set_override(&mut tx, &canonical, &payload.permissions, auth.id)
        .await?;

    AuditEvent::new("role.permissions.update", "role_permission")
        .actor(auth.id)
        .target(canonical.clone())
        .before(json!({ "permissions": change.before }))
        .after(json!({ "permissions": change.after }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok(Json(entry_for(&state, &canonical).await?))
}

#[utoipa::path(
    post,
    path = "/admin/role-permissions/{role}/reset",
    tag = "RBAC Admin",
    params(("role" = String, Path, description = "Role name or historical alias")),
    responses(
        (status = 200, description = "Role pinned back to catalog defaults", body = RolePermissionsEntry),
        (status = 404, description = "Unknown role")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reset_role_permissions(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(role): Path<String>,
) -> AppResult<Json<RolePermissionsEntry>> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_MANAGE)
        .await?;
    let canonical = canonical_known_role(&state, &role)?;

    let mut tx = state.pool.begin().await?;
    let change = state
        .engine
        .store()
        .reset_override(&mut tx, &canonical, auth.id)
        .await?;

    AuditEvent::new("role.permissions.reset", "role_permission")
        .actor(auth.id)
        .target(canonical.clone())
        .before(json!({ "permissions": change.before }))
        .after(json!({ "permissions": change.after }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok(Json(entry_for(&state, &canonical).await?))
}

#[utoipa::path(
    post,
    path = "/admin/role-permissions/reset-all",
    tag = "RBAC Admin",
    responses((status = 200, description = "Every catalog role pinned back to defaults", body = Vec<RolePermissionsEntry>)),
    security(("bearerAuth" = []))
)]
pub async fn reset_all_role_permissions(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
) -> AppResult<Json<Vec<RolePermissionsEntry>>> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_MANAGE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let changes = state.engine.store().reset_all(&mut tx, auth.id).await?;

    // One entry for the sweep rather than one per role.
    let changed_roles: Vec<&str> = changes
        .iter()
        .filter(|change| change.changed())
        .map(|change| change.role.as_str())
        .collect();
    let all_roles: Vec<&str> = state.catalog.roles().collect();

    AuditEvent::new("role.permissions.reset_all", "role_permission")
        .actor(auth.id)
        .before(json!({ "changed_roles": changed_roles }))
        .after(json!({ "roles": all_roles }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok(Json(all_entries(&state).await?))
}

// =============================================================================
// HELPERS
// =============================================================================

fn canonical_known_role(state: &AppState, raw: &str) -> AppResult<String> {
    let canonical = state.catalog.canonical_role(raw);
    if !state.catalog.is_known(&canonical) {
        return Err(AppError::not_found("unknown role"));
    }
    Ok(canonical)
}

async fn all_entries(state: &AppState) -> AppResult<Vec<RolePermissionsEntry>> {
    let roles: Vec<String> = state.catalog.roles().map(str::to_string).collect();
    let mut entries = Vec::with_capacity(roles.len());
    for role in roles {
        entries.push(entry_for(state, &role).await?);
    }
    Ok(entries)
}

async fn entry_for(state: &AppState, role: &str) -> AppResult<RolePermissionsEntry> {
    let store = state.engine.store();
    let defaults: BTreeSet<String> = state.catalog.defaults_for(role);
    let effective = store.effective_permissions(&state.pool, role).await?;
    let overridden = store.stored(&state.pool, role).await?.is_some();

    let added = effective.difference(&defaults).cloned().collect();
    let removed = defaults.difference(&effective).cloned().collect();

    Ok(RolePermissionsEntry {
        role: role.to_string(),
        label: labels::role_label(role),
        defaults: defaults.into_iter().collect(),
        effective: effective.into_iter().collect(),
        added,
        removed,
        overridden,
    })
}
