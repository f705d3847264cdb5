//! Reconciliation reports: the default-vs-effective diff per role and the
//! capability grid exported as CSV for office review.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app::AppState;
use crate::authz::matrix::{self, RoleMatrixRow};
use crate::authz::permissions;
use crate::errors::AppResult;
use crate::jwt::CurrentUser;
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(access_matrix))
        .route("/export", get(export_access_matrix))
}

#[utoipa::path(
    get,
    path = "/admin/access-matrix",
    tag = "RBAC Admin",
    responses((status = 200, description = "Default vs effective diff per role", body = Vec<RoleMatrixRow>)),
    security(("bearerAuth" = []))
)]
pub async fn access_matrix(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<Vec<RoleMatrixRow>>> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_VIEW)
        .await?;

    let rows = matrix::build_matrix(&state.pool, &state.catalog, state.engine.store()).await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/admin/access-matrix/export",
    tag = "RBAC Admin",
    responses((status = 200, description = "Capability grid as CSV", content_type = "text/csv", body = String)),
    security(("bearerAuth" = []))
)]
pub async fn export_access_matrix(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<impl IntoResponse> {
    state
        .engine
        .require(&auth.principal(), permissions::ROLES_VIEW)
        .await?;

    let rows = matrix::capability_rows(&state.pool, &state.catalog, state.engine.store()).await?;
    let body = matrix::capability_csv(&rows);

    let filename = format!("access_matrix_{}.csv", utc_now().format("%Y%m%d_%H%M%S"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}
