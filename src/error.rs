//! Unified application error model and mapping helpers.
//! Domain errors (token, auth, schema, transport, bootstrap) are typed enums; the HTTP
//! surface folds them into `AppError`, which carries a stable code and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::server::bootstrap::BootstrapPhase;

/// Reasons a bearer token fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
}

impl TokenError {
    /// Stable machine-readable code, used as WebSocket close reason and in logs.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Expired => "token_expired",
            TokenError::Malformed => "token_malformed",
            TokenError::BadSignature => "token_bad_signature",
        }
    }
}

/// Login failures. One variant: which factor failed is never reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaBuildError {
    #[error("invalid schema definition: {reason}")]
    InvalidDefinition { reason: String },
    #[error("field {type_name}.{field} has no resolver binding")]
    UnboundField { type_name: String, field: String },
}

impl SchemaBuildError {
    pub fn invalid<S: Into<String>>(reason: S) -> Self {
        SchemaBuildError::InvalidDefinition { reason: reason.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind listener on {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Schema(#[from] SchemaBuildError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("bootstrap step requires phase {expected:?} but gateway is in {actual:?}")]
    OutOfOrder { expected: BootstrapPhase, actual: BootstrapPhase },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("signing key must be at least {min} bytes")]
    SigningKeyTooShort { min: usize },
}

/// Token encoding failure. Signing with a valid HMAC key does not fail in practice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token signing failed: {0}")]
pub struct IssueError(pub String);

/// Outcome of a rejected or failed login attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Issue(#[from] IssueError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Auth { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Auth { code, .. } | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Auth { message, .. } | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Auth { .. } => 401,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::auth("invalid_credentials", "invalid credentials"),
        }
    }
}

impl From<LoginError> for AppError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Auth(e) => e.into(),
            LoginError::Issue(e) => AppError::internal("internal_error".to_string(), e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn auth_error_is_opaque() {
        let app: AppError = AuthError::InvalidCredentials.into();
        assert_eq!(app.code_str(), "invalid_credentials");
        assert_eq!(app.message(), "invalid credentials");
        assert_eq!(app.http_status(), 401);
    }

    #[test]
    fn signing_failure_is_internal_not_auth() {
        let app: AppError = LoginError::from(IssueError("backend unavailable".into())).into();
        assert_eq!(app.http_status(), 500);
        let app: AppError = LoginError::from(AuthError::InvalidCredentials).into();
        assert_eq!(app, AppError::from(AuthError::InvalidCredentials));
    }

    #[test]
    fn token_error_codes_are_stable() {
        assert_eq!(TokenError::Expired.code(), "token_expired");
        assert_eq!(TokenError::Malformed.code(), "token_malformed");
        assert_eq!(TokenError::BadSignature.code(), "token_bad_signature");
    }

    #[test]
    fn serializes_with_type_tag() {
        let v = serde_json::to_value(AppError::auth("invalid_credentials", "invalid credentials")).unwrap();
        assert_eq!(v["type"], "auth");
        assert_eq!(v["code"], "invalid_credentials");
    }
}
