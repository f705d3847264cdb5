//! Certificate request workflow. Filing is open to clerical roles; the
//! approve/reject pair sits behind one review permission and only moves
//! requests out of `pending`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{snapshot, AuditEvent, RequestContext};
use crate::authz::permissions;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentUser;
use crate::models::certificate::{Certificate, CertificateCreateRequest, DbCertificate};
use crate::models::status;
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_certificates).post(create_certificate))
        .route("/:id/approve", post(approve_certificate))
        .route("/:id/reject", post(reject_certificate))
}

#[utoipa::path(
    get,
    path = "/certificates",
    tag = "Certificates",
    responses((status = 200, description = "Certificate requests, newest first", body = Vec<Certificate>)),
    security(("bearerAuth" = []))
)]
pub async fn list_certificates(
    State(state): State<AppState>,
    auth: CurrentUser,
) -> AppResult<Json<Vec<Certificate>>> {
    state
        .engine
        .require(&auth.principal(), permissions::CERTIFICATES_VIEW)
        .await?;

    let rows: Vec<DbCertificate> = sqlx::query_as(
        "SELECT id, resident_id, certificate_type, purpose, status, created_by, decided_by, decided_at, created_at, updated_at
         FROM certificates ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    let certificates = rows
        .into_iter()
        .map(Certificate::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(certificates))
}

#[utoipa::path(
    post,
    path = "/certificates",
    tag = "Certificates",
    request_body = CertificateCreateRequest,
    responses(
        (status = 201, description = "Certificate request filed", body = Certificate),
        (status = 404, description = "Resident not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_certificate(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Json(payload): Json<CertificateCreateRequest>,
) -> AppResult<(StatusCode, Json<Certificate>)> {
    state
        .engine
        .require(&auth.principal(), permissions::CERTIFICATES_CREATE)
        .await?;

    if payload.certificate_type.trim().is_empty() {
        return Err(AppError::bad_request("certificate_type is required"));
    }

    let resident_exists: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM residents WHERE id = ?")
        .bind(payload.resident_id.to_string())
        .fetch_one(&state.pool)
        .await?;
    if resident_exists == 0 {
        return Err(AppError::not_found("resident not found"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();

    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO certificates (id, resident_id, certificate_type, purpose, status, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(payload.resident_id.to_string())
    .bind(payload.certificate_type.trim())
    .bind(&payload.purpose)
    .bind(status::PENDING)
    .bind(auth.id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let certificate: Certificate = fetch_certificate(&mut tx, id).await?.try_into()?;

    AuditEvent::new("certificate.created", "certificate")
        .actor(auth.id)
        .target(id.to_string())
        .after(snapshot(&certificate)?)
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(certificate)))
}

#[utoipa::path(
    post,
    path = "/certificates/{id}/approve",
    tag = "Certificates",
    params(("id" = Uuid, Path, description = "Certificate id")),
    responses(
        (status = 200, description = "Certificate approved", body = Certificate),
        (status = 404, description = "Certificate not found"),
        (status = 409, description = "Certificate already decided")
    ),
    security(("bearerAuth" = []))
)]
pub async fn approve_certificate(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Certificate>> {
    decide(&state, &auth, &headers, id, status::APPROVED).await
}

#[utoipa::path(
    post,
    path = "/certificates/{id}/reject",
    tag = "Certificates",
    params(("id" = Uuid, Path, description = "Certificate id")),
    responses(
        (status = 200, description = "Certificate rejected", body = Certificate),
        (status = 404, description = "Certificate not found"),
        (status = 409, description = "Certificate already decided")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reject_certificate(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Certificate>> {
    decide(&state, &auth, &headers, id, status::REJECTED).await
}

/// One review permission covers both outcomes, and only pending requests
/// can be decided.
async fn decide(
    state: &AppState,
    auth: &CurrentUser,
    headers: &HeaderMap,
    id: Uuid,
    outcome: &str,
) -> AppResult<Json<Certificate>> {
    state
        .engine
        .require(&auth.principal(), permissions::CERTIFICATES_APPROVE)
        .await?;

    let mut tx = state.pool.begin().await?;
    let existing = fetch_certificate(&mut tx, id).await?;
    if existing.status != status::PENDING {
        return Err(AppError::conflict("certificate already decided"));
    }
    let before: Certificate = existing.try_into()?;

    let now = utc_now();
    sqlx::query(
        "UPDATE certificates SET status = ?, decided_by = ?, decided_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(outcome)
    .bind(auth.id.to_string())
    .bind(now)
    .bind(now)
    .bind(id.to_string())
    .execute(&mut *tx)
    .await?;

    let after: Certificate = fetch_certificate(&mut tx, id).await?.try_into()?;

    let action = match outcome {
        status::APPROVED => "certificate.approved",
        _ => "certificate.rejected",
    };
    AuditEvent::new(action, "certificate")
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

async fn fetch_certificate(conn: &mut SqliteConnection, id: Uuid) -> AppResult<DbCertificate> {
    let row: Option<DbCertificate> = sqlx::query_as(
        "SELECT id, resident_id, certificate_type, purpose, status, created_by, decided_by, decided_at, created_at, updated_at
         FROM certificates WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| AppError::not_found("certificate not found"))
}
