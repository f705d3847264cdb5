use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Certificate {
    pub id: Uuid,
    pub resident_id: Uuid,
    #[schema(example = "barangay_clearance")]
    pub certificate_type: String,
    pub purpose: Option<String>,
    #[schema(example = "pending")]
    pub status: String,
    pub created_by: Option<Uuid>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCertificate {
    pub id: String,
    pub resident_id: String,
    pub certificate_type: String,
    pub purpose: Option<String>,
    pub status: String,
    pub created_by: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCertificate> for Certificate {
    type Error = AppError;

    fn try_from(value: DbCertificate) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|_| {
            AppError::internal(format!("certificate row {} has a malformed id", value.id))
        })?;
        let resident_id = Uuid::parse_str(&value.resident_id).map_err(|_| {
            AppError::internal(format!(
                "certificate row {} references a malformed resident id",
                value.id
            ))
        })?;
        Ok(Certificate {
            id,
            resident_id,
            certificate_type: value.certificate_type,
            purpose: value.purpose,
            status: value.status,
            created_by: value.created_by.and_then(|v| Uuid::parse_str(&v).ok()),
            decided_by: value.decided_by.and_then(|v| Uuid::parse_str(&v).ok()),
            decided_at: value.decided_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CertificateCreateRequest {
    pub resident_id: Uuid,
    #[schema(example = "barangay_clearance")]
    pub certificate_type: String,
    #[schema(example = "employment requirement")]
    pub purpose: Option<String>,
}
