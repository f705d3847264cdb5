use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::audit::{AuditEvent, RequestContext};
use crate::authz::roles;
use crate::errors::{AppError, AppResult};
use crate::jwt::CurrentUser;
use crate::models::user::{AuthResponse, DbUser, LoginRequest, MeResponse, RegisterRequest, User};
use crate::utils::{hash_password, utc_now, verify_password, PASSWORD_MIN_LEN};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if payload.password.len() < PASSWORD_MIN_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = uuid::Uuid::new_v4();

    // New accounts start as staff; an administrator promotes them afterwards.
    let mut tx = state.pool.begin().await?;
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(roles::STAFF_USER)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    AuditEvent::new("user.registered", "user")
        .actor(user_id)
        .target(user_id.to_string())
        .after(serde_json::json!({
            "name": name,
            "email": payload.email,
            "role": roles::STAFF_USER,
        }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user: Option<DbUser> = sqlx::query_as(
        "SELECT id, name, email, password_hash, role, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?;

    let db_user = db_user.ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id)?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current session", body = MeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: CurrentUser) -> AppResult<Json<MeResponse>> {
    let db_user = fetch_user_by_id(&state.pool, auth.id).await?;
    let user: User = db_user.try_into()?;

    let principal = auth.principal();
    let canonical_role = state.catalog.canonical_role(&user.role);
    let permissions = state.engine.effective_for(&principal).await?;
    let delegation_active = canonical_role == roles::STAFF_USER
        && state.engine.gate().is_enabled(&state.pool).await?;

    Ok(Json(MeResponse {
        user,
        canonical_role,
        permissions: permissions.into_iter().collect(),
        delegation_active,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged")),
    security(("bearerAuth" = []))
)]
pub async fn logout(_auth: CurrentUser) -> AppResult<Json<MessageResponse>> {
    // Tokens are stateless; the client drops its copy.
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: uuid::Uuid) -> AppResult<DbUser> {
    let user: Option<DbUser> = sqlx::query_as(
        "SELECT id, name, email, password_hash, role, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    user.ok_or_else(|| AppError::not_found("user not found"))
}
