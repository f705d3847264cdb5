use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;
use uuid::Uuid;

use munidesk::{app, jwt};

async fn seed_user(pool: &SqlitePool, role: &str) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    let now = chrono::Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, 'hash', ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(format!("{} user", role))
    .bind(format!("{}-{}@example.com", role, user_id))
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();

    let jwt_config = jwt::JwtConfig {
        secret: std::sync::Arc::new(b"test_secret".to_vec()),
        exp_hours: 1,
    };
    (user_id, jwt_config.encode(user_id).unwrap())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[sqlx::test]
async fn matrix_diffs_effective_sets_against_defaults(pool: SqlitePool) {
    std::env::set_var("JWT_SECRET", "test_secret");
    let app = app::create_app(pool.clone()).await.unwrap();
    let (_, admin_token) = seed_user(&pool, "administrator").await;

    // untouched installation: every role sits on its defaults
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/access-matrix")
                .header("Authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rows = body_json(response).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 5);
    for row in rows {
        assert_eq!(row["defaults"], row["effective"], "role {}", row["role"]);
        assert!(row["added"].as_array().unwrap().is_empty());
        assert!(row["removed"].as_array().unwrap().is_empty());
    }

    // grant staff an extra permission and drop one default
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/admin/role-permissions/staff_user")
                .header("Authorization", format!("Bearer {}", admin_token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"permissions": [
                        "residents.view",
                        "residents.create",
                        "residents.update",
                        "certificates.view",
                        "certificates.create",
                        "blotter.view",
                        "documents.view",
                        "programs.view"
                    ]})
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/access-matrix")
                .header("Authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let rows = body_json(response).await;
    let staff = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["role"] == "staff_user")
        .expect("staff_user row");
    assert_eq!(staff["added"], json!(["residents.update"]));
    assert_eq!(staff["removed"], json!(["blotter.create"]));

    // trimming finance to a subset of its defaults shows up as removals only
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/admin/role-permissions/finance_officer")
                .header("Authorization", format!("Bearer {}", admin_token))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"permissions": [
                        "finance.payment.view",
                        "finance.payment.create",
                        "residents.view",
                        "documents.view"
                    ]})
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/access-matrix")
                .header("Authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let rows = body_json(response).await;
    let finance = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["role"] == "finance_officer")
        .expect("finance_officer row");
    assert_eq!(finance["role_label"], "Finance Officer");
    assert!(finance["added"].as_array().unwrap().is_empty());
    assert_eq!(finance["removed"], json!(["finance.payment.export"]));

    let finance_updates: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs WHERE action = 'role.permissions.update' AND target_id = 'finance_officer'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(finance_updates, 1);
}

#[sqlx::test]
async fn capability_export_renders_the_office_csv(pool: SqlitePool) {
    std::env::set_var("JWT_SECRET", "test_secret");
    let app = app::create_app(pool.clone()).await.unwrap();
    let (_, admin_token) = seed_user(&pool, "administrator").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/admin/access-matrix/export")
                .header("Authorization", format!("Bearer {}", admin_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("access_matrix_"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Role,Module,Capability,Status,Required Permissions,Required Permission Keys,Effective Permission Count"
    );
    // every catalog role appears with its display label
    for label in [
        "Administrator",
        "Records Officer",
        "Finance Officer",
        "Welfare Officer",
        "Staff User",
    ] {
        assert!(csv.contains(label), "missing {label} in export");
    }
    // administrators clear every capability check
    assert!(!csv
        .lines()
        .any(|line| line.starts_with("Administrator,") && line.contains(",blocked,")));
    // staff cannot approve certificates by default
    assert!(csv
        .lines()
        .any(|line| line
            .starts_with("Staff User,Certificates,Approve or reject certificates,blocked")));
}

#[sqlx::test]
async fn matrix_requires_roles_view(pool: SqlitePool) {
    std::env::set_var("JWT_SECRET", "test_secret");
    let app = app::create_app(pool.clone()).await.unwrap();
    let (_, staff_token) = seed_user(&pool, "staff_user").await;

    for uri in ["/admin/access-matrix", "/admin/access-matrix/export"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .header("Authorization", format!("Bearer {}", staff_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
    }
}
