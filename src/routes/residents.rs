use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentUser;
use crate::models::resident::{DbResident, Resident, ResidentCreateRequest, ResidentUpdateRequest};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_residents).post(create_resident))
        .route("/:id", get(get_resident).put(update_resident))
}

#[utoipa::path(
    get,
    path = "/residents",
    tag = "Residents",
    responses((status = 200, description = "Resident registry", body = Vec<Resident>)),
    security(("bearerAuth" = []))
)]
pub async fn list_residents(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<Vec<Resident>>> {
    state
        .engine
        .require(&auth.principal(), permissions::RESIDENTS_VIEW)
        .await?;

    let rows: Vec<DbResident> = sqlx::query_as(
        "SELECT id, first_name, last_name, birth_date, address, contact_number, created_by, created_at, updated_at
         FROM residents ORDER BY last_name, first_name",
    )
    .fetch_all(&state.pool)
    .await?;

    let residents = rows
        .into_iter()
        .map(Resident::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(residents))
}

#[utoipa::path(
    get,
    path = "/residents/{id}",
    tag = "Residents",
    params(("id" = Uuid, Path, description = "Resident id")),
    responses(
        (status = 200, description = "Resident detail", body = Resident),
        (status = 404, description = "Resident not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_resident(
    State(state): State<AppState>,
    auth: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Resident>> {
    state
        .engine
        .require(&auth.principal(), permissions::RESIDENTS_VIEW)
        .await?;

    let mut conn = state.pool.acquire().await?;
    let resident = fetch_resident(&mut conn, id).await?;
    Ok(Json(resident.try_into()?))
}

#[utoipa::path(
    post,
    path = "/residents",
    tag = "Residents",
    request_body = ResidentCreateRequest,
    responses((status = 201, description = "Resident registered", body = Resident)),
    security(("bearerAuth" = []))
)]
pub async fn create_resident(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Json(payload): Json<ResidentCreateRequest>,
) -> AppResult<(StatusCode, Json<Resident>)> {
    state
        .engine
        .require(&auth.principal(), permissions::RESIDENTS_CREATE)
        .await?;

    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(AppError::bad_request("first and last name are required"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO residents (id, first_name, last_name, birth_date, address, contact_number, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(payload.birth_date)
    .bind(&payload.address)
    .bind(&payload.contact_number)
    .bind(auth.id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let resident: Resident = fetch_resident(&mut tx, id).await?.try_into()?;

    AuditEvent::new("resident.created", "resident")
        .actor(auth.id)
        .target(id.to_string())
        .after(snapshot(&resident)?)
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(resident)))
}

#[utoipa::path(
    put,
    path = "/residents/{id}",
    tag = "Residents",
    params(("id" = Uuid, Path, description = "Resident id")),
    request_body = ResidentUpdateRequest,
    responses(
        (status = 200, description = "Resident updated", body = Resident),
        (status = 404, description = "Resident not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_resident(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResidentUpdateRequest>,
) -> AppResult<Json<Resident>> {
    state
        .engine
        .require(&auth.principal(), permissions::RESIDENTS_UPDATE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let existing = fetch_resident(&mut tx, id).await?;
    let before: Resident = existing.clone().try_into()?;

    let first_name = payload.first_name.unwrap_or(existing.first_name);
    let last_name = payload.last_name.unwrap_or(existing.last_name);
    let birth_date = payload.birth_date.or(existing.birth_date);
    let address = payload.address.or(existing.address);
    let contact_number = payload.contact_number.or(existing.contact_number);

    if first_name.trim().is_empty() || last_name.trim().is_empty() {
        return Err(AppError::bad_request("first and last name are required"));
    }

    sqlx::query(
        "UPDATE residents SET first_name = ?, last_name = ?, birth_date = ?, address = ?, contact_number = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(first_name.trim())
    .bind(last_name.trim())
    .bind(birth_date)
    .bind(&address)
    .bind(&contact_number)
    .bind(utc_now())
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    let after: Resident = fetch_resident(&mut tx, id).await?.try_into()?;

    AuditEvent::new("resident.updated", "resident")
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

async fn fetch_resident(conn: &mut SqliteConnection, id: Uuid) -> AppResult<DbResident> {
    let row: Option<DbResident> = sqlx::query_as(
        "SELECT id, first_name, last_name, birth_date, address, contact_number, created_by, created_at, updated_at
         FROM residents WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| AppError::not_found("resident not found"))
}
