//! Token exchange endpoint
//!
//! `POST /token` redeems a proxy authorization code for a proxy access
//! token. Only the `authorization_code` grant exists. Checks run in a fixed
//! order and the first failure wins; the code is consumed atomically, so a
//! code can never be redeemed twice.

use axum::Form;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use oauth_store::{AccessToken, AuthorizationCode, Redemption, ids, now_millis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AppState;
use crate::config::PkceVerification;
use crate::error::{OAuthError, OAuthResult};
use crate::metrics;
use crate::pkce;

#[derive(Debug, Default, Deserialize)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<TokenParams>, FormRejection>,
) -> Response {
    metrics::observe("token", exchange(&state, &headers, form).await)
}

async fn exchange(
    state: &AppState,
    headers: &HeaderMap,
    form: Result<Form<TokenParams>, FormRejection>,
) -> OAuthResult<Response> {
    let Form(params) =
        form.map_err(|e| OAuthError::InvalidRequest(format!("invalid token request: {e}")))?;

    let grant_type = params.grant_type.as_deref().unwrap_or_default();
    if grant_type != "authorization_code" {
        return Err(OAuthError::UnsupportedGrantType(format!(
            "grant_type {grant_type:?} is not supported; use authorization_code"
        )));
    }

    let (client_id, client_secret) =
        client_credentials(params.client_id, params.client_secret, headers);
    let (Some(code), Some(client_id), Some(client_secret)) =
        (params.code.filter(|c| !c.is_empty()), client_id, client_secret)
    else {
        return Err(OAuthError::InvalidRequest(
            "code, client_id and client_secret are required".into(),
        ));
    };

    if state
        .store
        .validate_client(&client_id, Some(&client_secret))
        .await
        .is_none()
    {
        debug!(client_id, "client authentication failed");
        return Err(OAuthError::InvalidClient("invalid client credentials".into()));
    }

    let pkce_mode = state.settings.pkce;
    let redirect_uri = params.redirect_uri.filter(|r| !r.is_empty());
    let code_verifier = params.code_verifier;
    let redemption = state
        .store
        .redeem_auth_code(&code, now_millis(), |record| {
            check_code(
                record,
                &client_id,
                redirect_uri.as_deref(),
                code_verifier.as_deref(),
                pkce_mode,
            )
        })
        .await;

    let record = match redemption {
        Redemption::Redeemed(record) => record,
        Redemption::NotFound => {
            return Err(OAuthError::InvalidGrant("invalid authorization code".into()));
        }
        Redemption::Expired => {
            return Err(OAuthError::InvalidGrant("authorization code expired".into()));
        }
        Redemption::Rejected(err) => return Err(err),
    };

    let expires_in = state.settings.access_token_ttl.as_secs();
    let token = AccessToken {
        token: ids::new_access_token(),
        client_id: client_id.clone(),
        user: record.user,
        scope: record.scope,
        expires_at: now_millis() + state.settings.access_token_ttl.as_millis() as u64,
    };
    let response = TokenResponse {
        access_token: token.token.clone(),
        token_type: "Bearer",
        expires_in,
        scope: token.scope.clone(),
    };
    info!(client_id, scope = ?token.scope, expires_in, "issued access token");
    state.store.put_access_token(token).await;

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        Json(response),
    )
        .into_response())
}

/// Checks that run under the store lock before the code is consumed.
/// A failure leaves the code in place.
fn check_code(
    record: &AuthorizationCode,
    client_id: &str,
    redirect_uri: Option<&str>,
    code_verifier: Option<&str>,
    pkce_mode: PkceVerification,
) -> Result<(), OAuthError> {
    if record.client_id != client_id {
        return Err(OAuthError::InvalidGrant(
            "authorization code was issued to another client".into(),
        ));
    }
    if let Some(uri) = redirect_uri
        && uri != record.redirect_uri
    {
        return Err(OAuthError::InvalidGrant("redirect_uri mismatch".into()));
    }
    pkce::check(
        pkce_mode,
        record.code_challenge.as_deref(),
        record.code_challenge_method.as_deref(),
        code_verifier,
    )
}

/// Client credentials from exactly one method: the form
/// (`client_secret_post`) when it carries either field, otherwise an
/// `Authorization: Basic` header (`client_secret_basic`). Fields are never
/// mixed across the two.
fn client_credentials(
    form_id: Option<String>,
    form_secret: Option<String>,
    headers: &HeaderMap,
) -> (Option<String>, Option<String>) {
    let form_id = form_id.filter(|v| !v.is_empty());
    let form_secret = form_secret.filter(|v| !v.is_empty());
    if form_id.is_some() || form_secret.is_some() {
        return (form_id, form_secret);
    }
    match basic_credentials(headers) {
        Some((id, secret)) => (
            Some(id).filter(|v| !v.is_empty()),
            Some(secret).filter(|v| !v.is_empty()),
        ),
        None => (None, None),
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_owned(), secret.to_owned()))
}
