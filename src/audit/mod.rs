//! Append-only audit trail for privileged mutations.
//!
//! Entries are written inside the same transaction as the mutation they
//! document; if the audit insert fails the whole operation rolls back. Rows
//! are chained with SHA-256 over the previous hash and the entry payload so
//! after-the-fact edits to the table are detectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

pub mod export;
pub mod masking;

pub use export::audit_csv;
pub use masking::present_snapshot;

/// Request context captured alongside each entry (IP, User-Agent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Pull the client address and agent out of the request headers. The
    /// first `x-forwarded-for` hop wins, then `x-real-ip`.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

/// Builder for one audit entry. Construct, attach what you have, then
/// [`record`](AuditEvent::record) it on the transaction performing the
/// mutation.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    actor_id: Option<Uuid>,
    action: String,
    target_type: String,
    target_id: Option<String>,
    before: Option<Value>,
    after: Option<Value>,
    context: RequestContext,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            action: action.into(),
            target_type: target_type.into(),
            target_id: None,
            before: None,
            after: None,
            context: RequestContext::default(),
        }
    }

    pub fn actor(mut self, id: Uuid) -> Self {
        self.actor_id = Some(id);
        self
    }

    pub fn target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }

    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    /// Append the entry, extending the hash chain. Every failure maps to
    /// [`AppError::AuditWrite`] so the caller's transaction rolls back with
    /// the mutation it was documenting.
    pub async fn record(self, conn: &mut SqliteConnection) -> AppResult<()> {
        if self.before.is_none() && self.after.is_none() && !is_read_action(&self.action) {
            return Err(AppError::internal(format!(
                "audit entry for {} needs a before or after snapshot",
                self.action
            )));
        }

        let created_at = utc_now();
        let payload = serde_json::json!({
            "actor_id": self.actor_id,
            "action": self.action,
            "target_type": self.target_type,
            "target_id": self.target_id,
            "before": self.before,
            "after": self.after,
            "created_at": created_at,
        });
        let payload_str = payload.to_string();

        // chain head read and append run on the caller's transaction
        let prev_hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM audit_logs ORDER BY rowid DESC LIMIT 1")
                .fetch_optional(&mut *conn)
                .await
                .map_err(AppError::AuditWrite)?;

        let mut hasher = Sha256::new();
        if let Some(ref prev) = prev_hash {
            hasher.update(prev.as_bytes());
        }
        hasher.update(payload_str.as_bytes());
        let hash = hex::encode(hasher.finalize());

        sqlx::query(
            "INSERT INTO audit_logs
                 (id, actor_id, action, target_type, target_id, before_state, after_state,
                  source_ip, user_agent, prev_hash, hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(self.actor_id.map(|id| id.to_string()))
        .bind(&self.action)
        .bind(&self.target_type)
        .bind(&self.target_id)
        .bind(self.before.as_ref().map(Value::to_string))
        .bind(self.after.as_ref().map(Value::to_string))
        .bind(&self.context.ip)
        .bind(&self.context.user_agent)
        .bind(&prev_hash)
        .bind(&hash)
        .bind(created_at)
        .execute(&mut *conn)
        .await
        .map_err(AppError::AuditWrite)?;

        Ok(())
    }
}

/// Actions allowed to carry no snapshot at all.
fn is_read_action(action: &str) -> bool {
    action.ends_with(".viewed") || action.ends_with(".exported") || action.ends_with(".downloaded")
}

/// Serialize a record into a snapshot value for `before`/`after`.
pub fn snapshot<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|err| AppError::internal(format!("encode snapshot: {err}")))
}

/// Human label for an audit action token, total over any input.
pub fn action_label(action: &str) -> String {
    match action {
        "role.permissions.update" => "Updated role permissions".to_string(),
        "role.permissions.reset" => "Reset role permissions to defaults".to_string(),
        "role.permissions.reset_all" => "Reset all role permissions to defaults".to_string(),
        "delegation.toggle" => "Toggled staff approval delegation".to_string(),
        "resident.created" => "Created resident record".to_string(),
        "resident.updated" => "Updated resident record".to_string(),
        "certificate.created" => "Filed certificate request".to_string(),
        "certificate.approved" => "Approved certificate request".to_string(),
        "certificate.rejected" => "Rejected certificate request".to_string(),
        "blotter.created" => "Filed blotter entry".to_string(),
        "blotter.approved" => "Approved blotter entry".to_string(),
        "blotter.rejected" => "Rejected blotter entry".to_string(),
        "user.registered" => "Registered user account".to_string(),
        "audit.exported" => "Exported audit trail".to_string(),
        other => {
            let mut label = other.replace('.', " ").replace('_', " ");
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            label
        }
    }
}

/// Filters accepted by the audit listing and export endpoints.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            actor_id: None,
            action: None,
            target_type: None,
            from: None,
            to: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// One stored entry joined with the actor's account details. Snapshots are
/// raw as written; run them through [`present_snapshot`] before display.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditRecord {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
    #[schema(example = "role.permissions.update")]
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DbAuditRow {
    id: String,
    actor_id: Option<String>,
    actor_name: Option<String>,
    actor_email: Option<String>,
    action: String,
    target_type: String,
    target_id: Option<String>,
    before_state: Option<String>,
    after_state: Option<String>,
    source_ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl DbAuditRow {
    fn into_record(self) -> AuditRecord {
        AuditRecord {
            id: self.id,
            actor_id: self.actor_id,
            actor_name: self.actor_name,
            actor_email: self.actor_email,
            action: self.action,
            target_type: self.target_type,
            target_id: self.target_id,
            before: self.before_state.and_then(|s| serde_json::from_str(&s).ok()),
            after: self.after_state.and_then(|s| serde_json::from_str(&s).ok()),
            source_ip: self.source_ip,
            user_agent: self.user_agent,
            created_at: self.created_at,
        }
    }
}

/// Newest-first page of audit entries matching the filter. The actor join is
/// a weak reference: entries survive the referenced user's deletion and come
/// back with null name/email.
pub async fn fetch_entries(pool: &SqlitePool, filter: &AuditFilter) -> AppResult<Vec<AuditRecord>> {
    let mut sql = String::from(
        "SELECT a.id, a.actor_id, u.name AS actor_name, u.email AS actor_email,
                a.action, a.target_type, a.target_id, a.before_state, a.after_state,
                a.source_ip, a.user_agent, a.created_at
         FROM audit_logs a
         LEFT JOIN users u ON u.id = a.actor_id
         WHERE 1 = 1",
    );
    if filter.actor_id.is_some() {
        sql.push_str(" AND a.actor_id = ?");
    }
    if filter.action.is_some() {
        sql.push_str(" AND a.action = ?");
    }
    if filter.target_type.is_some() {
        sql.push_str(" AND a.target_type = ?");
    }
    if filter.from.is_some() {
        sql.push_str(" AND a.created_at >= ?");
    }
    if filter.to.is_some() {
        sql.push_str(" AND a.created_at <= ?");
    }
    sql.push_str(" ORDER BY a.created_at DESC, a.rowid DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, DbAuditRow>(&sql);
    if let Some(actor_id) = filter.actor_id {
        query = query.bind(actor_id.to_string());
    }
    if let Some(ref action) = filter.action {
        query = query.bind(action);
    }
    if let Some(ref target_type) = filter.target_type {
        query = query.bind(target_type);
    }
    if let Some(from) = filter.from {
        query = query.bind(from);
    }
    if let Some(to) = filter.to {
        query = query.bind(to);
    }
    let rows = query
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(DbAuditRow::into_record).collect())
}

/// Count matching entries, ignoring pagination. Same filter semantics as
/// [`fetch_entries`].
pub async fn count_entries(pool: &SqlitePool, filter: &AuditFilter) -> AppResult<i64> {
    let mut sql = String::from("SELECT COUNT(*) FROM audit_logs a WHERE 1 = 1");
    if filter.actor_id.is_some() {
        sql.push_str(" AND a.actor_id = ?");
    }
    if filter.action.is_some() {
        sql.push_str(" AND a.action = ?");
    }
    if filter.target_type.is_some() {
        sql.push_str(" AND a.target_type = ?");
    }
    if filter.from.is_some() {
        sql.push_str(" AND a.created_at >= ?");
    }
    if filter.to.is_some() {
        sql.push_str(" AND a.created_at <= ?");
    }

    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(actor_id) = filter.actor_id {
        query = query.bind(actor_id.to_string());
    }
    if let Some(ref action) = filter.action {
        query = query.bind(action);
    }
    if let Some(ref target_type) = filter.target_type {
        query = query.bind(target_type);
    }
    if let Some(from) = filter.from {
        query = query.bind(from);
    }
    if let Some(to) = filter.to {
        query = query.bind(to);
    }

    Ok(query.fetch_one(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn entries_chain_hashes() {
        let pool = test_pool().await;
        let actor = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        AuditEvent::new("delegation.toggle", "delegation_setting")
            .actor(actor)
            .target("1")
            .before(serde_json::json!({"staff_can_approve": false}))
            .after(serde_json::json!({"staff_can_approve": true}))
            .record(&mut conn)
            .await
            .unwrap();
        AuditEvent::new("delegation.toggle", "delegation_setting")
            .actor(actor)
            .target("1")
            .before(serde_json::json!({"staff_can_approve": true}))
            .after(serde_json::json!({"staff_can_approve": false}))
            .record(&mut conn)
            .await
            .unwrap();
        drop(conn);

        let rows: Vec<(Option<String>, String)> =
            sqlx::query_as("SELECT prev_hash, hash FROM audit_logs ORDER BY rowid")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].0.is_none());
        assert_eq!(rows[1].0.as_deref(), Some(rows[0].1.as_str()));
        assert_ne!(rows[0].1, rows[1].1);
    }

    #[tokio::test]
    async fn mutation_entries_require_a_snapshot() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let err = AuditEvent::new("resident.updated", "resident")
            .actor(Uuid::new_v4())
            .record(&mut conn)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        // pure read actions may omit both snapshots
        AuditEvent::new("audit.exported", "audit_log")
            .actor(Uuid::new_v4())
            .record(&mut conn)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn filters_narrow_the_listing() {
        let pool = test_pool().await;
        let actor_a = Uuid::new_v4();
        let actor_b = Uuid::new_v4();

        let mut conn = pool.acquire().await.unwrap();
        AuditEvent::new("resident.created", "resident")
            .actor(actor_a)
            .target("r-1")
            .after(serde_json::json!({"name": "A"}))
            .record(&mut conn)
            .await
            .unwrap();
        AuditEvent::new("blotter.created", "blotter")
            .actor(actor_b)
            .target("b-1")
            .after(serde_json::json!({"title": "B"}))
            .record(&mut conn)
            .await
            .unwrap();
        drop(conn);

        let all = fetch_entries(&pool, &AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filter = AuditFilter {
            actor_id: Some(actor_a),
            ..AuditFilter::default()
        };
        let mine = fetch_entries(&pool, &filter).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].action, "resident.created");

        let filter = AuditFilter {
            action: Some("blotter.created".to_string()),
            ..AuditFilter::default()
        };
        assert_eq!(count_entries(&pool, &filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        for index in 0..3 {
            AuditEvent::new("resident.created", "resident")
                .actor(Uuid::new_v4())
                .target(format!("r-{index}"))
                .after(serde_json::json!({"seq": index}))
                .record(&mut conn)
                .await
                .unwrap();
        }
        drop(conn);

        let rows = fetch_entries(&pool, &AuditFilter::default()).await.unwrap();
        let targets: Vec<_> = rows.iter().filter_map(|r| r.target_id.as_deref()).collect();
        assert_eq!(targets, vec!["r-2", "r-1", "r-0"]);
    }

    #[test]
    fn action_labels_are_total() {
        assert_eq!(action_label("role.permissions.update"), "Updated role permissions");
        assert_eq!(action_label("certificate.approved"), "Approved certificate request");
        assert_eq!(action_label("payment.voided"), "Payment voided");
    }
}
