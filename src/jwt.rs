use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Principal;
use crate::errors::AppError;
use crate::models::DbUser;

/// HS256 signing configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::configuration("JWT_SECRET not set"))?;

        let exp_hours = match std::env::var("JWT_EXP_HOURS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?,
            Err(_) => 24,
        };

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            exp_hours,
        })
    }

    pub fn encode(&self, user_id: Uuid) -> Result<String, AppError> {
        let issued = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (issued + Duration::hours(self.exp_hours)).timestamp() as usize,
            iat: issued.timestamp() as usize,
        };

        let key = EncodingKey::from_secret(&self.secret);
        jsonwebtoken::encode(&Header::default(), &claims, &key)
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let key = DecodingKey::from_secret(&self.secret);
        jsonwebtoken::decode::<Claims>(token, &key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

/// `sub` carries the account id; timestamps are unix seconds.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated account for the current request. The token only proves the
/// account id; name, email, and crucially the role are re-read from the
/// database per request, so a role change applies to live sessions without
/// waiting for the token to expire.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl CurrentUser {
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role.clone())
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state.jwt.decode(bearer_token(parts)?)?;

        let row: Option<DbUser> = sqlx::query_as(
            "SELECT id, name, email, password_hash, role, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(claims.sub.to_string())
        .fetch_optional(&state.pool)
        .await?;

        let user = row.ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

        Ok(CurrentUser {
            id: claims.sub,
            name: user.name,
            email: user.email,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(exp_hours: i64) -> JwtConfig {
        JwtConfig {
            secret: Arc::new(b"unit-test-secret".to_vec()),
            exp_hours,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let jwt = config(1);
        let user_id = Uuid::new_v4();
        let token = jwt.encode(user_id).unwrap();
        let claims = jwt.decode(&token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = config(-1);
        let token = jwt.encode(Uuid::new_v4()).unwrap();
        assert!(jwt.decode(&token).is_err());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let token = config(1).encode(Uuid::new_v4()).unwrap();
        let other = JwtConfig {
            secret: Arc::new(b"different-secret".to_vec()),
            exp_hours: 1,
        };
        assert!(other.decode(&token).is_err());
    }
}
