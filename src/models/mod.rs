pub mod blotter;
pub mod certificate;
pub mod resident;
pub mod user;

/// Workflow states a review item (certificate request, blotter entry) moves
/// through. Stored as plain text; the schema enforces the allowed values.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
}

pub use blotter::{Blotter, BlotterCreateRequest, BlotterUpdateRequest, DbBlotter};
pub use certificate::{Certificate, CertificateCreateRequest, DbCertificate};
pub use resident::{DbResident, Resident, ResidentCreateRequest, ResidentUpdateRequest};
pub use user::{AuthResponse, DbUser, LoginRequest, MeResponse, RegisterRequest, User};
