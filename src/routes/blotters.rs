//! Blotter (incident report) workflow. Same shape as certificates with an
//! extra edit operation while an entry is still pending review.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentUser;
use crate::models::blotter::{Blotter, BlotterCreateRequest, BlotterUpdateRequest, DbBlotter};
use crate::models::status;
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_blotters).post(create_blotter))
        .route("/:id", put(update_blotter))
        .route("/:id/approve", post(approve_blotter))
        .route("/:id/reject", post(reject_blotter))
}

#[utoipa::path(
    get,
    path = "/blotters",
    tag = "Blotter",
    responses((status = 200, description = "Blotter entries, newest first", body = Vec<Blotter>)),
    security(("bearerAuth" = []))
)]
pub async fn list_blotters(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<Vec<Blotter>>> {
    state
        .engine
        .require(&auth.principal(), permissions::BLOTTER_VIEW)
        .await?;

    let rows: Vec<DbBlotter> = sqlx::query_as(
        "SELECT id, complainant_name, respondent_name, details, incident_date, status, created_by, decided_by, decided_at, created_at, updated_at
         FROM blotters ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let blotters = rows
        .into_iter()
        .map(Blotter::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(blotters))
}

#[utoipa::path(
    post,
    path = "/blotters",
    tag = "Blotter",
    request_body = BlotterCreateRequest,
    responses((status = 201, description = "Blotter entry filed", body = Blotter)),
    security(("bearerAuth" = []))
)]
pub async fn create_blotter(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Json(payload): Json<BlotterCreateRequest>,
) -> AppResult<(StatusCode, Json<Blotter>)> {
    state
        .engine
        .require(&auth.principal(), permissions::BLOTTER_CREATE)
        .await?;

    if payload.complainant_name.trim().is_empty() || payload.details.trim().is_empty() {
        return Err(AppError::bad_request("complainant_name and details are required"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO blotters (id, complainant_name, respondent_name, details, incident_date, status, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(payload.complainant_name.trim())
    .bind(payload.respondent_name.trim())
    .bind(payload.details.trim())
    .bind(payload.incident_date)
    .bind(status::PENDING)
    .bind(auth.id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let blotter: Blotter = fetch_blotter(&mut tx, id).await?.try_into()?;

    AuditEvent::new("blotter.created", "blotter")
        .actor(auth.id)
        .target(id.to_string())
        .after(snapshot(&blotter)?)
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(blotter)))
}

#[utoipa::path(
    put,
    path = "/blotters/{id}",
    tag = "Blotter",
    params(("id" = Uuid, Path, description = "Blotter id")),
    request_body = BlotterUpdateRequest,
    responses(
        (status = 200, description = "Blotter entry updated", body = Blotter),
        (status = 404, description = "Blotter entry not found"),
        (status = 409, description = "Blotter entry already decided")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_blotter(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlotterUpdateRequest>,
) -> AppResult<Json<Blotter>> {
    state
        .engine
        .require(&auth.principal(), permissions::BLOTTER_UPDATE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let existing = fetch_blotter(&mut tx, id).await?;
    if existing.status != status::PENDING {
        return Err(AppError::conflict("blotter entry already decided"));
    }
    let before: Blotter = existing.clone().try_into()?;

    let complainant_name = payload.complainant_name.unwrap_or(existing.complainant_name);
    let respondent_name = payload.respondent_name.unwrap_or(existing.respondent_name);
    let details = payload.details.unwrap_or(existing.details);
    let incident_date = payload.incident_date.or(existing.incident_date);

    if complainant_name.trim().is_empty() || details.trim().is_empty() {
        return Err(AppError::bad_request("complainant_name and details are required"));
    }

    sqlx::query(
        "UPDATE blotters SET complainant_name = ?, respondent_name = ?, details = ?, incident_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(complainant_name.trim())
    .bind(respondent_name.trim())
    .bind(details.trim())
    .bind(incident_date)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    let after: Blotter = fetch_blotter(&mut tx, id).await?.try_into()?;

    AuditEvent::new("blotter.updated", "blotter")
        .actor(auth.id)
        .target(id.to_string())
        .before(snapshot(&before)?)
        .after(snapshot(&after)?)
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok(Json(after))
}

#[utoipa::path(
    post,
    path = "/blotters/{id}/approve",
    tag = "Blotter",
    params(("id" = Uuid, Path, description = "Blotter id")),
    responses(
        (status = 200, description = "Blotter entry approved", body = Blotter),
        (status = 404, description = "Blotter entry not found"),
        (status = 409, description = "Blotter entry already decided")
    ),
    security(("bearerAuth" = []))
)]
pub async fn approve_blotter(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Blotter>> {
    decide(&state, &auth, &headers, id, status::APPROVED).await
}

#[utoipa::path(
    post,
    path = "/blotters/{id}/reject",
    tag = "Blotter",
    params(("id" = Uuid, Path, description = "Blotter id")),
    responses(
        (status = 200, description = "Blotter entry rejected", body = Blotter),
        (status = 404, description = "Blotter entry not found"),
        (status = 409, description = "Blotter entry already decided")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reject_blotter(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Blotter>> {
    decide(&state, &auth, &headers, id, status::REJECTED).await
}

async fn decide(
    state: &AppState,
    auth: &CurrentUser,
    headers: &HeaderMap,
    id: Uuid,
    outcome: &str,
) -> AppResult<Json<Blotter>> {
    state
        .engine
        .require(&auth.principal(), permissions::BLOTTER_APPROVE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let existing = fetch_blotter(&mut tx, id).await?;
    if existing.status != status::PENDING {
        return Err(AppError::conflict("blotter entry already decided"));
    }
    let before: Blotter = existing.try_into()?;

    let now = utc_now();
    sqlx::query(
        "UPDATE blotters SET status = ?, decided_by = ?, decided_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(outcome)
    .bind(auth.id.to_string())
    .bind(now)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    let after: Blotter = fetch_blotter(&mut tx, id).await?.try_into()?;

    let action = match outcome {
        status::APPROVED => "blotter.approved",
        _ => "blotter.rejected",
    };
    AuditEvent::new(action, "blotter")
        .actor(auth.id)
        .target(id.to_string())
        .before(snapshot(&before)?)
        .after(snapshot(&after)?)
        .context(RequestContext::from_headers(headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok(Json(after))
}

async fn fetch_blotter(conn: &mut SqliteConnection, id: Uuid) -> AppResult<DbBlotter> {
    let row: Option<DbBlotter> = sqlx::query_as(
        "SELECT id, complainant_name, respondent_name, details, incident_date, status, created_by, decided_by, decided_at, created_at, updated_at
         FROM blotters WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| AppError::not_found("blotter entry not found"))
}
