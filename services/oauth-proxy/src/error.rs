//! OAuth error responses
//!
//! Every endpoint failure is one of the standard OAuth error codes and
//! renders as `{"error": ..., "error_description": ...}` JSON. Nothing here
//! is fatal to the process; each error is scoped to one request.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Request-scoped OAuth failure carrying a human-readable description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("invalid_token: {0}")]
    InvalidToken(String),

    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),

    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// Wire error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::AccessDenied(_) => "access_denied",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::ServerError(_) => "server_error",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::InvalidRequest(d)
            | Self::InvalidClient(d)
            | Self::InvalidGrant(d)
            | Self::UnsupportedGrantType(d)
            | Self::AccessDenied(d)
            | Self::InvalidToken(d)
            | Self::InsufficientScope(d)
            | Self::ServerError(d) => d,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// `WWW-Authenticate` value for bearer-token failures.
    ///
    /// `resource_metadata` points clients at the protected-resource metadata
    /// document so they can discover where to obtain a token.
    pub fn bearer_challenge(&self, resource_metadata: Option<&str>) -> Option<HeaderValue> {
        if !matches!(self, Self::InvalidToken(_) | Self::InsufficientScope(_)) {
            return None;
        }
        let description = self.description().replace('"', "'");
        let mut challenge = format!(
            r#"Bearer error="{}", error_description="{description}""#,
            self.code()
        );
        if let Some(url) = resource_metadata {
            challenge.push_str(&format!(r#", resource_metadata="{url}""#));
        }
        Some(HeaderValue::from_str(&challenge).unwrap_or(HeaderValue::from_static("Bearer")))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "error_description": self.description(),
        })
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.to_json())).into_response();
        if let Some(challenge) = self.bearer_challenge(None) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

pub type OAuthResult<T> = std::result::Result<T, OAuthError>;
