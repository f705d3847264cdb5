//! CSV rendering of audit entries for the office's compliance exports.

use crate::audit::masking::present_snapshot;
use crate::audit::{action_label, AuditRecord};
use crate::utils::csv_line;

/// Display name for a polymorphic audit target type.
pub fn target_module_label(target_type: &str) -> String {
    match target_type {
        "role_permission" => "Role Permissions".to_string(),
        "delegation_setting" => "Delegation".to_string(),
        "resident" => "Residents".to_string(),
        "certificate" => "Certificates".to_string(),
        "blotter" => "Blotter".to_string(),
        "user" => "Users".to_string(),
        "audit_log" => "Audit Logs".to_string(),
        other => {
            let mut label = other.replace('_', " ");
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            label
        }
    }
}

/// Render entries as CSV, newest-first as fetched. Snapshots go through the
/// masking and labeling pipeline; the stored rows stay raw.
pub fn audit_csv(rows: &[AuditRecord]) -> String {
    let mut out = csv_line([
        "Date",
        "Actor Name",
        "Actor Email",
        "Action",
        "Target Module",
        "Target Id",
        "Before",
        "After",
        "Source IP",
    ]);
    for row in rows {
        let before = row
            .before
            .as_ref()
            .map(|v| present_snapshot(v).to_string())
            .unwrap_or_default();
        let after = row
            .after
            .as_ref()
            .map(|v| present_snapshot(v).to_string())
            .unwrap_or_default();
        out.push_str(&csv_line([
            row.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            row.actor_name.clone().unwrap_or_else(|| "System".to_string()),
            row.actor_email.clone().unwrap_or_default(),
            action_label(&row.action),
            target_module_label(&row.target_type),
            row.target_id.clone().unwrap_or_default(),
            before,
            after,
            row.source_ip.clone().unwrap_or_default(),
        ]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(action: &str, before: Option<serde_json::Value>) -> AuditRecord {
        AuditRecord {
            id: "a-1".to_string(),
            actor_id: Some("u-1".to_string()),
            actor_name: Some("Alma Reyes".to_string()),
            actor_email: Some("alma@example.test".to_string()),
            action: action.to_string(),
            target_type: "role_permission".to_string(),
            target_id: Some("finance_officer".to_string()),
            before,
            after: Some(json!({"permissions": ["finance.payment.view"]})),
            source_ip: Some("10.0.0.7".to_string()),
            user_agent: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn rows_are_masked_and_labeled() {
        let rows = vec![record(
            "role.permissions.update",
            Some(json!({"permissions": ["finance.payment.view", "finance.payment.create"], "password": "x"})),
        )];
        let csv = audit_csv(&rows);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Actor Name,Actor Email,Action,Target Module,Target Id,Before,After,Source IP"
        );
        let body = lines.next().unwrap();
        assert!(body.starts_with("2026-03-14 09:30:00,Alma Reyes,alma@example.test,Updated role permissions,Role Permissions,finance_officer,"));
        assert!(body.contains("View payments"));
        assert!(body.contains("[REDACTED]"));
        // raw tokens and secret values never reach the export
        assert!(!body.contains("finance.payment.view"));
        assert!(!body.contains("\"\"x\"\""));
        assert!(body.ends_with("10.0.0.7"));
    }

    #[test]
    fn system_entries_render_without_an_actor() {
        let mut row = record("delegation.toggle", None);
        row.actor_id = None;
        row.actor_name = None;
        row.actor_email = None;
        let csv = audit_csv(&[row]);
        let body = csv.lines().nth(1).unwrap();
        assert!(body.contains(",System,,"));
    }
}
