//! Authorization redirector
//!
//! `GET /authorize` validates the client's request, packs its parameters into
//! a signed state blob and sends the user-agent to the upstream provider with
//! the proxy's own fixed scope. The client's PKCE challenge stays with the
//! proxy; the provider never sees it.

use axum::extract::{Query, State};
use axum::response::Response;
use oauth_store::now_millis;
use serde::Deserialize;
use tracing::{debug, info};

use crate::AppState;
use crate::config::PkceVerification;
use crate::error::{OAuthError, OAuthResult};
use crate::metrics;
use crate::pkce;
use crate::redirect;
use crate::state_codec::{AuthorizationRequestState, STATE_VERSION};

#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub resource: Option<String>,
}

pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    metrics::observe("authorize", authorize(&state, params).await)
}

async fn authorize(state: &AppState, params: AuthorizeParams) -> OAuthResult<Response> {
    let request = validate(state, params).await?;

    let blob = state.codec.encode(&request);
    let target = state
        .provider
        .authorization_url(&blob, &state.settings.callback_url());

    info!(
        client_id = %request.client_id,
        provider = state.provider.id(),
        pkce = request.code_challenge.is_some(),
        "redirecting to upstream provider"
    );
    Ok(redirect::found(&target))
}

/// Run the request checks in order and capture the parameters to replay.
async fn validate(
    state: &AppState,
    params: AuthorizeParams,
) -> OAuthResult<AuthorizationRequestState> {
    let (Some(client_id), Some(redirect_uri)) = (
        params.client_id.filter(|v| !v.is_empty()),
        params.redirect_uri.filter(|v| !v.is_empty()),
    ) else {
        return Err(OAuthError::InvalidRequest(
            "client_id and redirect_uri are required".into(),
        ));
    };
    let response_type = params.response_type.unwrap_or_default();
    if response_type != "code" {
        return Err(OAuthError::InvalidRequest(format!(
            "response_type must be \"code\", got {response_type:?}"
        )));
    }

    let Some(client) = state.store.get_client(&client_id).await else {
        debug!(client_id, "authorize for unknown client");
        return Err(OAuthError::InvalidClient(format!(
            "unknown client_id {client_id}"
        )));
    };

    if !client.allows_redirect(&redirect_uri) {
        return Err(OAuthError::InvalidRequest(
            "redirect_uri is not registered for this client".into(),
        ));
    }

    let code_challenge = params.code_challenge.filter(|c| !c.is_empty());
    let code_challenge_method = code_challenge
        .as_ref()
        .and(params.code_challenge_method.filter(|m| !m.is_empty()));
    // Presence-only deployments accept whatever method the client names
    if state.settings.pkce == PkceVerification::Enforce
        && code_challenge.is_some()
        && !pkce::is_supported_method(code_challenge_method.as_deref())
    {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be S256 or plain".into(),
        ));
    }

    Ok(AuthorizationRequestState {
        v: STATE_VERSION,
        client_id,
        redirect_uri,
        response_type,
        state: params.state,
        scope: params.scope.filter(|s| !s.trim().is_empty()),
        code_challenge,
        code_challenge_method,
        resource: params.resource,
        issued_at: now_millis(),
    })
}
