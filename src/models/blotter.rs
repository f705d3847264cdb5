use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Blotter {
    pub id: Uuid,
    #[schema(example = "Rosa Dimaculangan")]
    pub complainant_name: String,
    #[schema(example = "Unknown vendor")]
    pub respondent_name: String,
    pub details: String,
    #[schema(example = "2026-02-18")]
    pub incident_date: Option<NaiveDate>,
    #[schema(example = "pending")]
    pub status: String,
    pub created_by: Option<Uuid>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbBlotter {
    pub id: String,
    pub complainant_name: String,
    pub respondent_name: String,
    pub details: String,
    pub incident_date: Option<NaiveDate>,
    pub status: String,
    pub created_by: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbBlotter> for Blotter {
    type Error = AppError;

    fn try_from(value: DbBlotter) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|_| {
            AppError::internal(format!("blotter row {} has a malformed id", value.id))
        })?;
        Ok(Blotter {
            id,
            complainant_name: value.complainant_name,
            respondent_name: value.respondent_name,
            details: value.details,
            incident_date: value.incident_date,
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
pub struct BlotterCreateRequest {
    #[schema(example = "Rosa Dimaculangan")]
    pub complainant_name: String,
    #[schema(example = "Unknown vendor")]
    pub respondent_name: String,
    #[schema(example = "Stall blocking the fire lane on Mabini St")]
    pub details: String,
    #[schema(example = "2026-02-18")]
    pub incident_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BlotterUpdateRequest {
    pub complainant_name: Option<String>,
    pub respondent_name: Option<String>,
    pub details: Option<String>,
    pub incident_date: Option<NaiveDate>,
}
