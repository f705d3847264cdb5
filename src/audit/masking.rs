//! Read-time presentation rules for audit snapshots.
//!
//! Raw snapshots are stored exactly as the caller provided them. Before a
//! snapshot reaches a listing or export, sensitive values are redacted and
//! permission arrays are mapped to their human labels. Neither rule ever
//! rewrites the stored row.

use serde_json::Value;

use crate::authz::labels::permission_label;

pub const REDACTION_MARKER: &str = "[REDACTED]";

const SENSITIVE_FRAGMENTS: [&str; 6] = ["password", "token", "secret", "remember", "otp", "pin"];

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

fn is_permission_key(key: &str) -> bool {
    key == "permissions" || key.ends_with("_permissions")
}

/// Replace the value of any key containing a sensitive fragment with the
/// redaction marker, recursing through nested objects and arrays.
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(REDACTION_MARKER.to_string()));
                } else {
                    out.insert(key.clone(), mask_sensitive(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}

/// Rewrite permission-set fields (`permissions` or `*_permissions`) as human
/// labels, leaving every other field alone.
pub fn label_permission_sets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let rewritten = match inner {
                    Value::Array(items) if is_permission_key(key) => Value::Array(
                        items
                            .iter()
                            .map(|item| match item {
                                Value::String(token) => {
                                    Value::String(permission_label(token))
                                }
                                other => other.clone(),
                            })
                            .collect(),
                    ),
                    other => label_permission_sets(other),
                };
                out.insert(key.clone(), rewritten);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(label_permission_sets).collect()),
        other => other.clone(),
    }
}

/// The full display pipeline. Masking runs first so a key that is both
/// sensitive and permission-shaped (for example `token_permissions`) always
/// comes out redacted.
pub fn present_snapshot(value: &Value) -> Value {
    label_permission_sets(&mask_sensitive(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_sensitive_keys_recursively() {
        let raw = json!({
            "name": "Rosa",
            "password": "hunter2",
            "profile": {
                "api_token": "abc123",
                "nested": {"one_time_pin": "9999", "city": "San Mateo"}
            },
            "sessions": [{"remember_me": true}]
        });

        let masked = mask_sensitive(&raw);
        assert_eq!(masked["name"], "Rosa");
        assert_eq!(masked["password"], REDACTION_MARKER);
        assert_eq!(masked["profile"]["api_token"], REDACTION_MARKER);
        assert_eq!(masked["profile"]["nested"]["one_time_pin"], REDACTION_MARKER);
        assert_eq!(masked["profile"]["nested"]["city"], "San Mateo");
        assert_eq!(masked["sessions"][0]["remember_me"], REDACTION_MARKER);
    }

    #[test]
    fn masking_is_case_insensitive() {
        let raw = json!({"Password": "x", "API_TOKEN": "y", "ClientSecret": "z"});
        let masked = mask_sensitive(&raw);
        assert_eq!(masked["Password"], REDACTION_MARKER);
        assert_eq!(masked["API_TOKEN"], REDACTION_MARKER);
        assert_eq!(masked["ClientSecret"], REDACTION_MARKER);
    }

    #[test]
    fn labels_permission_arrays() {
        let raw = json!({
            "role": "finance_officer",
            "permissions": ["finance.payment.view", "finance.payment.create"],
            "old_permissions": ["finance.payment.view"]
        });

        let labeled = label_permission_sets(&raw);
        assert_eq!(labeled["role"], "finance_officer");
        assert_eq!(
            labeled["permissions"],
            json!(["View payments", "Create payments"])
        );
        assert_eq!(labeled["old_permissions"], json!(["View payments"]));
    }

    #[test]
    fn sensitive_wins_over_permission_shaping() {
        let raw = json!({"token_permissions": ["residents.view"]});
        let shown = present_snapshot(&raw);
        assert_eq!(shown["token_permissions"], REDACTION_MARKER);
    }

    #[test]
    fn scalars_pass_through_untouched() {
        let raw = json!(42);
        assert_eq!(present_snapshot(&raw), json!(42));
    }
}
