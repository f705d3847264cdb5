//! Audit trail review endpoints. The stored rows stay raw; everything served
//! from here runs through the masking and labeling pipeline first.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::export::target_module_label;
use crate::audit::{
    action_label, audit_csv, count_entries, fetch_entries, present_snapshot, AuditEvent,
    AuditFilter, AuditRecord, RequestContext,
};
use crate::authz::permissions;
use crate::errors::AppResult;
use crate::jwt::CurrentUser;
use crate::utils::utc_now;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;
const EXPORT_LIMIT: i64 = 10_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_audit_logs))
        .route("/export", get(export_audit_logs))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditLogQuery {
    fn into_filter(self, max_limit: i64, default_limit: i64) -> AuditFilter {
        AuditFilter {
            actor_id: self.actor_id,
            action: self.action,
            target_type: self.target_type,
            from: self.from,
            to: self.to,
            limit: self.limit.unwrap_or(default_limit).clamp(1, max_limit),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

/// One entry shaped for display: action and module labels resolved, snapshot
/// values masked and labeled.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
    #[schema(example = "role.permissions.update")]
    pub action: String,
    #[schema(example = "Updated role permissions")]
    pub label: String,
    pub target_type: String,
    pub target_module: String,
    pub target_id: Option<String>,
    #[schema(value_type = Object)]
    pub before: Option<Value>,
    #[schema(value_type = Object)]
    pub after: Option<Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRecord> for AuditLogEntry {
    fn from(record: AuditRecord) -> Self {
        AuditLogEntry {
            id: record.id,
            actor_id: record.actor_id,
            actor_name: record.actor_name,
            actor_email: record.actor_email,
            label: action_label(&record.action),
            action: record.action,
            target_module: target_module_label(&record.target_type),
            target_type: record.target_type,
            target_id: record.target_id,
            before: record.before.map(|v| present_snapshot(&v)),
            after: record.after.map(|v| present_snapshot(&v)),
            source_ip: record.source_ip,
            user_agent: record.user_agent,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub total: i64,
    pub entries: Vec<AuditLogEntry>,
}

#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    tag = "Audit",
    params(
        ("actor_id" = Option<Uuid>, Query, description = "Filter by acting user"),
        ("action" = Option<String>, Query, description = "Filter by action token"),
        ("target_type" = Option<String>, Query, description = "Filter by target module"),
        ("from" = Option<String>, Query, description = "Entries at or after this RFC 3339 timestamp"),
        ("to" = Option<String>, Query, description = "Entries at or before this RFC 3339 timestamp"),
        ("limit" = Option<i64>, Query, description = "Page size, 1-200, default 50"),
        ("offset" = Option<i64>, Query, description = "Rows to skip")
    ),
    responses((status = 200, description = "Newest-first audit entries", body = AuditLogResponse)),
    security(("bearerAuth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    auth: CurrentUser,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<Json<AuditLogResponse>> {
    state
        .engine
        .require(&auth.principal(), permissions::AUDIT_VIEW)
        .await?;

    let filter = query.into_filter(MAX_PAGE, DEFAULT_PAGE);
    let total = count_entries(&state.pool, &filter).await?;
    let records = fetch_entries(&state.pool, &filter).await?;

    Ok(Json(AuditLogResponse {
        total,
        entries: records.into_iter().map(AuditLogEntry::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/admin/audit-logs/export",
    tag = "Audit",
    params(
        ("actor_id" = Option<Uuid>, Query, description = "Filter by acting user"),
        ("action" = Option<String>, Query, description = "Filter by action token"),
        ("target_type" = Option<String>, Query, description = "Filter by target module"),
        ("from" = Option<String>, Query, description = "Entries at or after this RFC 3339 timestamp"),
        ("to" = Option<String>, Query, description = "Entries at or before this RFC 3339 timestamp")
    ),
    responses((status = 200, description = "Audit entries as CSV", content_type = "text/csv", body = String)),
    security(("bearerAuth" = []))
)]
pub async fn export_audit_logs(
    State(state): State<AppState>,
    auth: CurrentUser,
    headers: HeaderMap,
    Query(query): Query<AuditLogQuery>,
) -> AppResult<impl IntoResponse> {
    state
        .engine
        .require(&auth.principal(), permissions::AUDIT_EXPORT)
        .await?;

    let filter = query.into_filter(EXPORT_LIMIT, EXPORT_LIMIT);
    let records = fetch_entries(&state.pool, &filter).await?;
    let body = audit_csv(&records);

    // The export itself becomes part of the trail.
    let mut tx = state.pool.begin().await?;
    AuditEvent::new("audit.exported", "audit_log")
        .actor(auth.id)
        .after(json!({ "rows": records.len() }))
        .context(RequestContext::from_headers(&headers))
        .record(&mut tx)
        .await?;
    tx.commit().await?;

    let filename = format!("audit_logs_{}.csv", utc_now().format("%Y%m%d_%H%M%S"));
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
