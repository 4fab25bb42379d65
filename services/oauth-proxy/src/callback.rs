//! Provider callback handler
//!
//! `GET /callback` is where the upstream provider sends the user-agent after
//! login. The handler trades the provider's code for a provider token, looks
//! up the user, mints a proxy authorization code bound to that identity and
//! redirects back to the client that started the flow.
//!
//! Once the state blob verifies, every failure (including a client deleted
//! or changed mid-flow) is reported to the client as an error redirect.
//! Before that there is no trustworthy redirect target, so failures are JSON.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use oauth_store::{AuthorizationCode, ids, now_millis};
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::OAuthError;
use crate::metrics;
use crate::redirect;
use crate::state_codec::AuthorizationRequestState;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let (outcome, response) = callback(&state, params).await;
    metrics::record_request("callback", outcome);
    response
}

async fn callback(state: &AppState, params: CallbackParams) -> (&'static str, Response) {
    if let Some(error) = params.error {
        return upstream_denied(state, error, params.error_description, params.state);
    }

    let (Some(code), Some(blob)) = (
        params.code.filter(|c| !c.is_empty()),
        params.state.filter(|s| !s.is_empty()),
    ) else {
        let err = OAuthError::InvalidRequest("missing code or state parameter".into());
        return (err.code(), err.into_response());
    };

    let request = match state.codec.decode(&blob) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "callback state failed verification");
            let err = OAuthError::ServerError(format!("invalid state: {e}"));
            return (err.code(), err.into_response());
        }
    };

    let Some(client) = state.store.get_client(&request.client_id).await else {
        warn!(client_id = %request.client_id, "callback for client that no longer exists");
        let err = OAuthError::ServerError(format!("unknown client_id {}", request.client_id));
        return (err.code(), error_redirect(&request, &err));
    };
    if !client.allows_redirect(&request.redirect_uri) {
        warn!(client_id = %request.client_id, "callback redirect_uri no longer registered");
        let err = OAuthError::ServerError(
            "redirect_uri is no longer registered for this client".into(),
        );
        return (err.code(), error_redirect(&request, &err));
    }

    match complete(state, &request, &code).await {
        Ok(proxy_code) => {
            let target = redirect::with_params(
                &request.redirect_uri,
                &[
                    ("code", Some(proxy_code.as_str())),
                    ("state", request.state.as_deref()),
                ],
            );
            match target {
                Ok(target) => ("ok", redirect::found(&target)),
                Err(e) => {
                    let err = OAuthError::ServerError(format!("invalid redirect_uri: {e}"));
                    (err.code(), err.into_response())
                }
            }
        }
        Err(err) => {
            warn!(client_id = %request.client_id, error = %err, "callback failed");
            (err.code(), error_redirect(&request, &err))
        }
    }
}

/// Exchange the provider code, fetch the user and store a proxy code.
async fn complete(
    state: &AppState,
    request: &AuthorizationRequestState,
    upstream_code: &str,
) -> Result<String, OAuthError> {
    let callback_url = state.settings.callback_url();

    let started = Instant::now();
    let exchanged = state
        .provider
        .exchange_code(upstream_code, &callback_url)
        .await;
    metrics::record_upstream(
        "token_exchange",
        started.elapsed().as_secs_f64(),
        exchanged.is_ok(),
    );
    let upstream = exchanged.map_err(|e| OAuthError::ServerError(e.to_string()))?;

    let started = Instant::now();
    let fetched = state.provider.fetch_user(&upstream.access_token).await;
    metrics::record_upstream(
        "user_info",
        started.elapsed().as_secs_f64(),
        fetched.is_ok(),
    );
    let user = fetched.map_err(|e| OAuthError::ServerError(e.to_string()))?;

    let code = ids::new_authorization_code();
    let expires_at = now_millis() + state.settings.auth_code_ttl.as_millis() as u64;
    info!(
        client_id = %request.client_id,
        user = %user_login(&user),
        expires_at,
        "issuing authorization code"
    );

    state
        .store
        .put_auth_code(AuthorizationCode {
            code: code.clone(),
            client_id: request.client_id.clone(),
            upstream_access_token: upstream.access_token,
            user,
            scope: request.scope.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method.clone(),
            redirect_uri: request.redirect_uri.clone(),
            resource: request.resource.clone(),
            expires_at,
        })
        .await;

    Ok(code)
}

/// The provider redirected back with `error` (typically the user declined).
fn upstream_denied(
    state: &AppState,
    error: String,
    description: Option<String>,
    blob: Option<String>,
) -> (&'static str, Response) {
    let description = description.filter(|d| !d.is_empty()).unwrap_or(error);
    let err = OAuthError::AccessDenied(description);
    info!(error = %err, "upstream provider denied authorization");

    match blob.and_then(|b| state.codec.decode(&b).ok()) {
        Some(request) => (err.code(), error_redirect(&request, &err)),
        None => (err.code(), err.into_response()),
    }
}

/// Send the user-agent back to the client with `error` query parameters.
fn error_redirect(request: &AuthorizationRequestState, err: &OAuthError) -> Response {
    match redirect::with_params(
        &request.redirect_uri,
        &[
            ("error", Some(err.code())),
            ("error_description", Some(err.description())),
            ("state", request.state.as_deref()),
        ],
    ) {
        Ok(target) => redirect::found(&target),
        Err(_) => err.clone().into_response(),
    }
}

fn user_login(user: &serde_json::Value) -> &str {
    user.get("login").and_then(|l| l.as_str()).unwrap_or("unknown")
}
