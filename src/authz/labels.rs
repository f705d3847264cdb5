//! Human-readable names for roles, modules, and permission tokens.
//!
//! Every function here is total: unknown inputs fall back to title-cased
//! versions of themselves instead of erroring, so reports never render a
//! blank cell.

/// "records_officer" -> "Records Officer". Works for any snake_case input.
pub fn role_label(role: &str) -> String {
    match role {
        "administrator" => "Administrator".to_string(),
        "records_officer" => "Records Officer".to_string(),
        "finance_officer" => "Finance Officer".to_string(),
        "welfare_officer" => "Welfare Officer".to_string(),
        "staff_user" => "Staff User".to_string(),
        other => title_case(&other.replace('_', " ")),
    }
}

/// Display noun for a permission's module prefix, e.g. "finance.payment"
/// -> "Payments".
pub fn module_label(prefix: &str) -> String {
    match prefix {
        "residents" => "Residents".to_string(),
        "certificates" => "Certificates".to_string(),
        "blotter" => "Blotter".to_string(),
        "finance.payment" => "Payments".to_string(),
        "documents" => "Documents".to_string(),
        "programs" => "Programs".to_string(),
        "users" => "Users".to_string(),
        "roles" => "Roles".to_string(),
        "delegation" => "Delegation".to_string(),
        "audit" => "Audit Logs".to_string(),
        other => title_case(&other.replace('.', " ")),
    }
}

/// "finance.payment.export" -> "Export payments".
pub fn permission_label(token: &str) -> String {
    let Some((prefix, verb)) = token.rsplit_once('.') else {
        return title_case(token);
    };
    let noun = module_label(prefix).to_lowercase();
    format!("{} {noun}", title_case(verb))
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_labels_read_verb_first() {
        assert_eq!(permission_label("residents.view"), "View residents");
        assert_eq!(permission_label("certificates.approve"), "Approve certificates");
        assert_eq!(permission_label("finance.payment.export"), "Export payments");
        assert_eq!(permission_label("audit.view"), "View audit logs");
        assert_eq!(permission_label("delegation.manage"), "Manage delegation");
    }

    #[test]
    fn unknown_tokens_still_get_a_label() {
        assert_eq!(permission_label("livestock.tag"), "Tag livestock");
        assert_eq!(permission_label("oddball"), "Oddball");
    }

    #[test]
    fn role_labels() {
        assert_eq!(role_label("records_officer"), "Records Officer");
        assert_eq!(role_label("staff_user"), "Staff User");
        assert_eq!(role_label("night_watch"), "Night Watch");
    }

    #[test]
    fn every_catalog_permission_gets_a_label() {
        let catalog = crate::authz::PermissionCatalog::load().unwrap();
        for permission in catalog.all_permissions() {
            let label = permission_label(permission);
            assert!(!label.trim().is_empty(), "no label for {permission}");
        }
    }
}
