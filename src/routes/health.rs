use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::query_scalar;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

/// Liveness probe payload. `status` flips to `degraded` when the database
/// ping fails so monitors can alert without parsing `db_error`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Service liveness and database reachability", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let ping = query_scalar::<_, i64>("SELECT 1").fetch_one(&state.pool).await;

    let response = match ping {
        Ok(_) => HealthResponse {
            status: "ok",
            db_ok: true,
            db_error: None,
        },
        Err(err) => HealthResponse {
            status: "degraded",
            db_ok: false,
            db_error: Some(err.to_string()),
        },
    };

    Ok(Json(response))
}
