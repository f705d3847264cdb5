//! The staff approval delegation switch. One global row; flipping it takes
//! effect on the next permission check without restarting anything.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app::AppState;
use crate::audit::{AuditEvent, RequestContext};
use crate::authz::permissions;
use crate::authz::DelegationSetting;
use crate::errors::AppResult;
use crate::jwt::CurrentUser;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(current_delegation))
        .route("/toggle", post(toggle_delegation))
}

#[utoipa::path(
    get,
    path = "/admin/delegation",
    tag = "RBAC Admin",
    responses((status = 200, description = "Current delegation setting", body = DelegationSetting)),
    security(("bearerAuth" = []))
)]
pub async fn current_delegation(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<DelegationSetting>> {
    state
        .engine
        .require(&auth.principal(), permissions::DELEGATION_MANAGE)
        .await?;

    let setting = state.engine.gate().current(&state.pool).await?;
    Ok(Json(setting))
}

#[utoipa::path(
    post,
    path = "/admin/delegation/toggle",
    tag = "RBAC Admin",
    responses((status = 200, description = "Delegation flipped", body = DelegationSetting)),
    security(("bearerAuth" = []))
)]
pub async fn toggle_delegation(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
) -> AppResult<Json<DelegationSetting>> {
    state
        .engine
        .require(&auth.principal(), permissions::DELEGATION_MANAGE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let change = state.engine.gate().toggle(&mut tx, auth.id).await?;

    AuditEvent::new("delegation.toggle", "delegation_setting")
        .actor(auth.id)
        .target("1")
        .before(json!({ "staff_can_approve": change.before }))
        .after(json!({ "staff_can_approve": change.after }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;

    let setting = state.engine.gate().current_in(&mut tx).await?;
    tx.commit().await?;

    Ok(Json(setting))
}
