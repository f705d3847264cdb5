use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::authz;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::health::health,
		routes::residents::list_residents,
		routes::residents::get_resident,
		routes::residents::create_resident,
		routes::residents::update_resident,
		routes::certificates::list_certificates,
		routes::certificates::create_certificate,
		routes::certificates::approve_certificate,
		routes::certificates::reject_certificate,
		routes::blotters::list_blotters,
		routes::blotters::create_blotter,
		routes::blotters::update_blotter,
		routes::blotters::approve_blotter,
		routes::blotters::reject_blotter,
		routes::role_permissions::list_role_permissions,
		routes::role_permissions::update_role_permissions,
		routes::role_permissions::reset_role_permissions,
		routes::role_permissions::reset_all_role_permissions,
		routes::access_matrix::access_matrix,
		routes::access_matrix::export_access_matrix,
		routes::delegation::current_delegation,
		routes::delegation::toggle_delegation,
		routes::audit_logs::list_audit_logs,
		routes::audit_logs::export_audit_logs
	),
	components(
		schemas(
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::MeResponse,
			models::resident::Resident,
			models::resident::ResidentCreateRequest,
			models::resident::ResidentUpdateRequest,
			models::certificate::Certificate,
			models::certificate::CertificateCreateRequest,
			models::blotter::Blotter,
			models::blotter::BlotterCreateRequest,
			models::blotter::BlotterUpdateRequest,
			authz::matrix::RoleMatrixRow,
			authz::delegation::DelegationSetting,
			routes::auth::MessageResponse,
			routes::health::HealthResponse,
			routes::role_permissions::RolePermissionsEntry,
			routes::role_permissions::UpdateRolePermissionsRequest,
			routes::audit_logs::AuditLogEntry,
			routes::audit_logs::AuditLogResponse
		)
	),
	tags(
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Health", description = "Liveness checks"),
		(name = "Residents", description = "Resident registry"),
		(name = "Certificates", description = "Certificate request workflow"),
		(name = "Blotter", description = "Incident report workflow"),
		(name = "RBAC Admin", description = "Role permissions, delegation, and the access matrix"),
		(name = "Audit", description = "Audit trail review and export")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	add_examples(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
	let components = doc
		.as_object_mut()
		.expect("OpenAPI root must be an object")
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.expect("components must be an object");

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.expect("securitySchemes must be an object");

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
}

fn ensure_global_security(doc: &mut Value) {
	doc
		.as_object_mut()
		.expect("OpenAPI root must be an object")
		.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn add_examples(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		for item in paths.values_mut() {
			if let Some(operations) = item.as_object_mut() {
				for operation in operations.values_mut() {
					apply_parameter_examples(operation);
				}
			}
		}
	}
}

fn apply_parameter_examples(operation: &mut Value) {
	if let Some(parameters) = operation
		.get_mut("parameters")
		.and_then(Value::as_array_mut)
	{
		for parameter in parameters.iter_mut() {
			let Some(name) = parameter.get("name").and_then(Value::as_str) else { continue; };
			let example = match name {
				"id" => Some(json!("00000000-0000-0000-0000-000000000000")),
				"role" => Some(json!("finance_officer")),
				_ => None,
			};
			if let (Some(example), Some(obj)) = (example, parameter.as_object_mut()) {
				obj.entry("example").or_insert(example);
			}
		}
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
