use std::sync::Arc;

use axum::http::Method;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{AccessEngine, PermissionCatalog};
use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{
    access_matrix, audit_logs, auth, blotters, certificates, delegation, health, residents,
    role_permissions,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub catalog: Arc<PermissionCatalog>,
    pub engine: AccessEngine,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, catalog: PermissionCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let engine = AccessEngine::new(pool.clone(), catalog.clone());
        Self {
            pool,
            jwt: Arc::new(jwt),
            catalog,
            engine,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let catalog = PermissionCatalog::load()?;
    let state = AppState::new(pool, jwt_config, catalog);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let admin_routes = Router::new()
        .nest("/role-permissions", role_permissions::routes())
        .nest("/access-matrix", access_matrix::routes())
        .nest("/delegation", delegation::routes())
        .nest("/audit-logs", audit_logs::routes());

    let router = Router::new()
        .nest("/auth", auth::routes())
        .nest("/api", health::routes())
        .nest("/admin", admin_routes)
        .nest("/residents", residents::routes())
        .nest("/certificates", certificates::routes())
        .nest("/blotters", blotters::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
