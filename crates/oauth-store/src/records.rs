//! Typed records held by the credential store
//!
//! Timestamps are unix milliseconds unless the field name says otherwise.
//! `Debug` output never includes secrets or bearer values.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Current time as unix seconds.
pub fn now_secs() -> u64 {
    now_millis() / 1000
}

/// A dynamically registered OAuth client.
///
/// Immutable after registration. The secret never expires.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub client_id: String,
    pub client_secret: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scopes: Vec<String>,
    /// Registration time as unix seconds (reported as `client_id_issued_at`)
    pub created_at: u64,
}

impl Client {
    /// Whether `uri` exactly matches one of the registered redirect URIs.
    pub fn allows_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| registered == uri)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("client_name", &self.client_name)
            .field("redirect_uris", &self.redirect_uris)
            .field("grant_types", &self.grant_types)
            .field("response_types", &self.response_types)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A proxy-issued authorization code waiting to be redeemed.
///
/// Bound to the user identity fetched from the upstream provider. Deleted on
/// redemption or when found expired.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    /// Access token the upstream provider issued to the proxy
    pub upstream_access_token: String,
    /// User profile as returned by the upstream provider
    pub user: serde_json::Value,
    /// Scope the client asked for at `/authorize` (space-delimited)
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub resource: Option<String>,
    pub expires_at: u64,
}

impl AuthorizationCode {
    /// Expired strictly after `expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCode")
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("code_challenge_method", &self.code_challenge_method)
            .field("redirect_uri", &self.redirect_uri)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A proxy-issued bearer token. Never mutated; expiry is the only way out.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub user: serde_json::Value,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_at: u64,
}

impl AccessToken {
    /// Expired strictly after `expires_at`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
