//! Dynamic client registration (RFC 7591)
//!
//! `POST /register` mints a client id and secret for any caller that names
//! itself and lists at least one absolute redirect URI. Redirect URIs must be
//! `https`, or `http` on a loopback host. Secrets never expire.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use oauth_store::{Client, ids, now_secs};
use serde::{Deserialize, Deserializer};
use url::{Host, Url};
use tracing::info;

use crate::AppState;
use crate::error::{OAuthError, OAuthResult};
use crate::metrics;

#[derive(Debug, Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Option<Vec<String>>,
    #[serde(default)]
    pub grant_types: Option<Vec<String>>,
    #[serde(default)]
    pub response_types: Option<Vec<String>>,
    /// Either a JSON array or a space-delimited string; `scope` is accepted too
    #[serde(default, alias = "scope", deserialize_with = "deserialize_scopes")]
    pub scopes: Option<Vec<String>>,
}

fn deserialize_scopes<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    Ok(
        match Option::<StringOrVec>::deserialize(deserializer)? {
            None => None,
            Some(StringOrVec::String(s)) => {
                Some(s.split_whitespace().map(String::from).collect())
            }
            Some(StringOrVec::Vec(v)) => Some(v),
        },
    )
}

pub async fn register_handler(State(state): State<AppState>, body: Bytes) -> Response {
    metrics::observe("register", register(&state, &body).await)
}

async fn register(state: &AppState, body: &[u8]) -> OAuthResult<Response> {
    let request: RegistrationRequest = serde_json::from_slice(body)
        .map_err(|e| OAuthError::InvalidRequest(format!("invalid registration body: {e}")))?;

    let client = build_client(request, &state.settings.default_client_scopes)?;
    let response = registration_response(&client);

    info!(
        client_id = %client.client_id,
        client_name = %client.client_name,
        redirect_uris = client.redirect_uris.len(),
        "registered client"
    );
    state.store.register_client(client).await;

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Validate a registration request and mint the client record.
pub fn build_client(request: RegistrationRequest, default_scopes: &[String]) -> OAuthResult<Client> {
    let client_name = request
        .client_name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("client_name is required".into()))?;

    let requested = request.redirect_uris.unwrap_or_default();
    if requested.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "redirect_uris must contain at least one URI".into(),
        ));
    }
    let mut redirect_uris: Vec<String> = Vec::with_capacity(requested.len());
    for uri in requested {
        let parsed = Url::parse(&uri).map_err(|e| {
            OAuthError::InvalidRequest(format!("redirect_uri {uri:?} is not an absolute URI: {e}"))
        })?;
        if !is_permitted_redirect(&parsed) {
            return Err(OAuthError::InvalidRequest(format!(
                "redirect_uri {uri:?} must use https, or http on a loopback host"
            )));
        }
        if !redirect_uris.contains(&uri) {
            redirect_uris.push(uri);
        }
    }

    let grant_types = non_empty_or(request.grant_types, || vec!["authorization_code".into()]);
    let response_types = non_empty_or(request.response_types, || vec!["code".into()]);
    let scopes = non_empty_or(request.scopes, || default_scopes.to_vec());

    Ok(Client {
        client_id: ids::new_client_id(),
        client_secret: ids::new_client_secret(),
        client_name,
        redirect_uris,
        grant_types,
        response_types,
        scopes,
        created_at: now_secs(),
    })
}

/// `https` anywhere, `http` only for native-app loopback redirects (RFC 8252).
fn is_permitted_redirect(url: &Url) -> bool {
    match url.scheme() {
        "https" => true,
        "http" => match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => false,
    }
}

fn non_empty_or(value: Option<Vec<String>>, default: impl FnOnce() -> Vec<String>) -> Vec<String> {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default(),
    }
}

fn registration_response(client: &Client) -> serde_json::Value {
    serde_json::json!({
        "client_id": client.client_id,
        "client_secret": client.client_secret,
        "client_id_issued_at": client.created_at,
        "client_secret_expires_at": 0,
        "client_name": client.client_name,
        "redirect_uris": client.redirect_uris,
        "grant_types": client.grant_types,
        "response_types": client.response_types,
        "scopes": client.scopes.join(" "),
        "token_endpoint_auth_method": "client_secret_post",
    })
}
