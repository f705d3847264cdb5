//! Authorization module - layered RBAC
//!
//! Resolution order for a permission check:
//! 1. per-role database override (when a row exists)
//! 2. static catalog defaults (versioned config, loaded once at startup)
//! 3. the delegation escape hatch (staff approvals only, globally toggled)
//!
//! Overrides are re-read on every check. There is deliberately no in-process
//! cache: an admin edit to a role's permissions must be visible on the very
//! next request.

pub mod catalog;
pub mod delegation;
pub mod engine;
pub mod labels;
pub mod matrix;
pub mod store;

pub use catalog::PermissionCatalog;
pub use delegation::{DelegationChange, DelegationGate, DelegationSetting};
pub use engine::{AccessEngine, Decision, DenyReason};
pub use store::{OverrideChange, OverrideStore};

use uuid::Uuid;

/// Identity handed to the decision engine by the session layer.
/// Carries the raw role string as stored on the user row; canonicalization
/// happens inside the engine via the catalog's alias table.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: String,
}

impl Principal {
    pub fn new(user_id: Uuid, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
        }
    }
}

/// Canonical role names. Historical aliases (see the `aliases` table in the
/// permission matrix config) resolve to these.
pub mod roles {
    pub const ADMINISTRATOR: &str = "administrator";
    pub const RECORDS_OFFICER: &str = "records_officer";
    pub const FINANCE_OFFICER: &str = "finance_officer";
    pub const WELFARE_OFFICER: &str = "welfare_officer";
    pub const STAFF_USER: &str = "staff_user";
}

/// Well-known permission tokens. Every constant here must exist in the
/// permission matrix config; `catalog::tests` asserts that.
pub mod permissions {
    // Residents
    pub const RESIDENTS_VIEW: &str = "residents.view";
    pub const RESIDENTS_CREATE: &str = "residents.create";
    pub const RESIDENTS_UPDATE: &str = "residents.update";
    pub const RESIDENTS_DELETE: &str = "residents.delete";

    // Certificates
    pub const CERTIFICATES_VIEW: &str = "certificates.view";
    pub const CERTIFICATES_CREATE: &str = "certificates.create";
    pub const CERTIFICATES_APPROVE: &str = "certificates.approve";

    // Blotter
    pub const BLOTTER_VIEW: &str = "blotter.view";
    pub const BLOTTER_CREATE: &str = "blotter.create";
    pub const BLOTTER_UPDATE: &str = "blotter.update";
    pub const BLOTTER_APPROVE: &str = "blotter.approve";

    // Payments
    pub const PAYMENTS_VIEW: &str = "finance.payment.view";
    pub const PAYMENTS_CREATE: &str = "finance.payment.create";
    pub const PAYMENTS_EXPORT: &str = "finance.payment.export";

    // Documents
    pub const DOCUMENTS_VIEW: &str = "documents.view";
    pub const DOCUMENTS_UPLOAD: &str = "documents.upload";
    pub const DOCUMENTS_DELETE: &str = "documents.delete";

    // Programs
    pub const PROGRAMS_VIEW: &str = "programs.view";
    pub const PROGRAMS_CREATE: &str = "programs.create";
    pub const PROGRAMS_UPDATE: &str = "programs.update";

    // Accounts
    pub const USERS_VIEW: &str = "users.view";
    pub const USERS_MANAGE: &str = "users.manage";

    // RBAC administration
    pub const ROLES_VIEW: &str = "roles.view";
    pub const ROLES_MANAGE: &str = "roles.manage";
    pub const DELEGATION_MANAGE: &str = "delegation.manage";
    pub const AUDIT_VIEW: &str = "audit.view";
    pub const AUDIT_EXPORT: &str = "audit.export";
}
