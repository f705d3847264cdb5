//! Reconciliation views over the permission system: default-vs-effective
//! diffs per role plus the per-capability grid exported for office review.
//!
//! Everything here is recomputed per call. The working set is tens of roles
//! by tens of permissions, so there is nothing worth caching.

use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::authz::catalog::PermissionCatalog;
use crate::authz::labels;
use crate::authz::permissions as perm;
use crate::authz::store::OverrideStore;
use crate::errors::AppResult;
use crate::utils::csv_line;

/// Default vs effective permission sets for one role, with the set diff both
/// directions. All four lists are lexicographically sorted; `added` and
/// `removed` are empty when no override diverges.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleMatrixRow {
    #[schema(example = "finance_officer")]
    pub role: String,
    #[schema(example = "Finance Officer")]
    pub role_label: String,
    pub defaults: Vec<String>,
    pub effective: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// One named ability and the permissions it takes to exercise it.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityCheck {
    pub module: &'static str,
    pub capability: &'static str,
    pub required: &'static [&'static str],
}

/// The checks the access matrix report runs for every role. Multi-permission
/// entries require the full set; holding a subset reads as blocked.
pub const CAPABILITY_CHECKS: &[CapabilityCheck] = &[
    CapabilityCheck {
        module: "Residents",
        capability: "View resident records",
        required: &[perm::RESIDENTS_VIEW],
    },
    CapabilityCheck {
        module: "Residents",
        capability: "Maintain resident records",
        required: &[perm::RESIDENTS_CREATE, perm::RESIDENTS_UPDATE],
    },
    CapabilityCheck {
        module: "Residents",
        capability: "Delete resident records",
        required: &[perm::RESIDENTS_DELETE],
    },
    CapabilityCheck {
        module: "Certificates",
        capability: "View certificate requests",
        required: &[perm::CERTIFICATES_VIEW],
    },
    CapabilityCheck {
        module: "Certificates",
        capability: "File certificate requests",
        required: &[perm::CERTIFICATES_CREATE],
    },
    CapabilityCheck {
        module: "Certificates",
        capability: "Approve or reject certificates",
        required: &[perm::CERTIFICATES_APPROVE],
    },
    CapabilityCheck {
        module: "Blotter",
        capability: "View blotter entries",
        required: &[perm::BLOTTER_VIEW],
    },
    CapabilityCheck {
        module: "Blotter",
        capability: "File and amend blotter entries",
        required: &[perm::BLOTTER_CREATE, perm::BLOTTER_UPDATE],
    },
    CapabilityCheck {
        module: "Blotter",
        capability: "Approve or reject blotter entries",
        required: &[perm::BLOTTER_APPROVE],
    },
    CapabilityCheck {
        module: "Payments",
        capability: "View payments",
        required: &[perm::PAYMENTS_VIEW],
    },
    CapabilityCheck {
        module: "Payments",
        capability: "Record payments",
        required: &[perm::PAYMENTS_CREATE],
    },
    CapabilityCheck {
        module: "Payments",
        capability: "Export payment reports",
        required: &[perm::PAYMENTS_VIEW, perm::PAYMENTS_EXPORT],
    },
    CapabilityCheck {
        module: "Documents",
        capability: "View documents",
        required: &[perm::DOCUMENTS_VIEW],
    },
    CapabilityCheck {
        module: "Documents",
        capability: "Upload documents",
        required: &[perm::DOCUMENTS_UPLOAD],
    },
    CapabilityCheck {
        module: "Documents",
        capability: "Delete documents",
        required: &[perm::DOCUMENTS_DELETE],
    },
    CapabilityCheck {
        module: "Programs",
        capability: "View assistance programs",
        required: &[perm::PROGRAMS_VIEW],
    },
    CapabilityCheck {
        module: "Programs",
        capability: "Maintain assistance programs",
        required: &[perm::PROGRAMS_CREATE, perm::PROGRAMS_UPDATE],
    },
    CapabilityCheck {
        module: "Users",
        capability: "View user accounts",
        required: &[perm::USERS_VIEW],
    },
    CapabilityCheck {
        module: "Users",
        capability: "Manage user accounts",
        required: &[perm::USERS_VIEW, perm::USERS_MANAGE],
    },
    CapabilityCheck {
        module: "Roles",
        capability: "View role permissions",
        required: &[perm::ROLES_VIEW],
    },
    CapabilityCheck {
        module: "Roles",
        capability: "Manage role permissions",
        required: &[perm::ROLES_VIEW, perm::ROLES_MANAGE],
    },
    CapabilityCheck {
        module: "Delegation",
        capability: "Toggle staff delegation",
        required: &[perm::DELEGATION_MANAGE],
    },
    CapabilityCheck {
        module: "Audit Logs",
        capability: "View audit trail",
        required: &[perm::AUDIT_VIEW],
    },
    CapabilityCheck {
        module: "Audit Logs",
        capability: "Export audit trail",
        required: &[perm::AUDIT_VIEW, perm::AUDIT_EXPORT],
    },
];

/// One (role, capability) cell of the exported grid.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CapabilityRow {
    pub role: String,
    pub module: String,
    pub capability: String,
    pub allowed: bool,
    pub required: Vec<String>,
    pub effective_count: usize,
}

/// Diff every catalog role's effective permissions against its defaults.
pub async fn build_matrix(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    store: &OverrideStore,
) -> AppResult<Vec<RoleMatrixRow>> {
    let mut rows = Vec::new();
    for role in catalog.roles() {
        let defaults = catalog.defaults_for(role);
        let effective = store.effective_permissions(pool, role).await?;
        let added = effective.difference(&defaults).cloned().collect();
        let removed = defaults.difference(&effective).cloned().collect();
        rows.push(RoleMatrixRow {
            role: role.to_string(),
            role_label: labels::role_label(role),
            defaults: defaults.into_iter().collect(),
            effective: effective.into_iter().collect(),
            added,
            removed,
        });
    }
    Ok(rows)
}

/// Run every capability check against every catalog role's effective set.
pub async fn capability_rows(
    pool: &SqlitePool,
    catalog: &PermissionCatalog,
    store: &OverrideStore,
) -> AppResult<Vec<CapabilityRow>> {
    let mut rows = Vec::with_capacity(catalog.roles().count() * CAPABILITY_CHECKS.len());
    for role in catalog.roles() {
        let effective = store.effective_permissions(pool, role).await?;
        for check in CAPABILITY_CHECKS {
            let allowed = check
                .required
                .iter()
                .all(|permission| effective.contains(*permission));
            rows.push(CapabilityRow {
                role: role.to_string(),
                module: check.module.to_string(),
                capability: check.capability.to_string(),
                allowed,
                required: check.required.iter().map(|p| p.to_string()).collect(),
                effective_count: effective.len(),
            });
        }
    }
    Ok(rows)
}

/// Render capability rows as the office's CSV layout.
pub fn capability_csv(rows: &[CapabilityRow]) -> String {
    let mut out = csv_line([
        "Role",
        "Module",
        "Capability",
        "Status",
        "Required Permissions",
        "Required Permission Keys",
        "Effective Permission Count",
    ]);
    for row in rows {
        let human = row
            .required
            .iter()
            .map(|token| labels::permission_label(token))
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&csv_line([
            labels::role_label(&row.role),
            row.module.clone(),
            row.capability.clone(),
            if row.allowed { "allowed" } else { "blocked" }.to_string(),
            human,
            row.required.join("; "),
            row.effective_count.to_string(),
        ]));
    }
    out
}
