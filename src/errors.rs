//! The crate-wide error type and its HTTP rendering.
//!
//! Every handler returns [`AppResult`]; whatever bubbles up is turned into a
//! JSON body of the form `{"error": <code>, "message": <text>}` with a status
//! matching the variant. Two variants carry RBAC-specific meaning:
//! [`AppError::InvalidPermissions`] rejects an override batch wholesale, and
//! [`AppError::AuditWrite`] signals that the trail insert failed, which must
//! abort the surrounding transaction.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    // Session problems: 401 either way.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("token error: {0}")]
    Token(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    // Request-shaped failures.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// An override batch named tokens outside the catalog universe. The whole
    /// batch is refused; the message lists every offender.
    #[error("invalid permissions: {}", .0.join(", "))]
    InvalidPermissions(Vec<String>),

    // Server-side failures. `AuditWrite` stays separate from `Database` so a
    // failed trail insert is recognizable when the mutation rolls back.
    #[error("audit write failed")]
    AuditWrite(#[source] sqlx::Error),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn invalid_permissions(offenders: impl IntoIterator<Item = String>) -> Self {
        Self::InvalidPermissions(offenders.into_iter().collect())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Status plus the machine-readable code for the response body.
    fn class(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Token(_) => (StatusCode::UNAUTHORIZED, "token"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::InvalidPermissions(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_permissions")
            }
            Self::AuditWrite(_) => (StatusCode::INTERNAL_SERVER_ERROR, "audit_write"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database"),
            Self::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.class();
        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
