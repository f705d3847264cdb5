use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Resident {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[schema(example = "1987-06-12")]
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbResident {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbResident> for Resident {
    type Error = AppError;

    fn try_from(value: DbResident) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|_| {
            AppError::internal(format!("resident row {} has a malformed id", value.id))
        })?;
        Ok(Resident {
            id,
            first_name: value.first_name,
            last_name: value.last_name,
            birth_date: value.birth_date,
            address: value.address,
            contact_number: value.contact_number,
            created_by: value.created_by.and_then(|v| Uuid::parse_str(&v).ok()),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResidentCreateRequest {
    #[schema(example = "Rosa")]
    pub first_name: String,
    #[schema(example = "Dimaculangan")]
    pub last_name: String,
    #[schema(example = "1987-06-12")]
    pub birth_date: Option<NaiveDate>,
    #[schema(example = "14 Mabini St, Zone 2")]
    pub address: Option<String>,
    #[schema(example = "+63 917 555 0142")]
    pub contact_number: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResidentUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
}
