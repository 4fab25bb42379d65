//! Bearer token validation
//!
//! [`validate`] resolves a proxy access token to the identity captured at
//! callback time. [`require_bearer`] wraps it as axum middleware for the
//! protected routes and hands the result to handlers as an [`AuthContext`]
//! request extension.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use oauth_store::{CredentialStore, now_millis};
use serde::Serialize;
use tracing::debug;

use crate::AppState;
use crate::config::Settings;
use crate::error::{OAuthError, OAuthResult};
use crate::metrics;

/// Who is calling a protected route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthContext {
    pub user: serde_json::Value,
    pub scopes: Vec<String>,
    pub client_id: String,
}

impl AuthContext {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Strip an optional `Bearer` prefix (any case) from a header value.
fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => value,
    }
}

/// Look up a proxy access token. Tokens that are unknown or past their
/// expiry are `invalid_token`; a token stored without a scope reports
/// `default_scope`.
pub async fn validate(
    store: &CredentialStore,
    default_scope: &str,
    bearer: &str,
) -> OAuthResult<AuthContext> {
    let token = strip_bearer(bearer);
    if token.is_empty() {
        return Err(OAuthError::InvalidToken("missing access token".into()));
    }

    let Some(record) = store.get_access_token(token).await else {
        return Err(OAuthError::InvalidToken(
            "invalid or expired access token".into(),
        ));
    };
    if record.is_expired(now_millis()) {
        debug!(client_id = %record.client_id, "rejected expired access token");
        return Err(OAuthError::InvalidToken("access token has expired".into()));
    }

    let scopes = match record.scope.as_deref().map(str::trim) {
        Some(scope) if !scope.is_empty() => scope.split_whitespace().map(String::from).collect(),
        _ => vec![default_scope.to_owned()],
    };

    Ok(AuthContext {
        user: record.user,
        scopes,
        client_id: record.client_id,
    })
}

/// Reject requests without a valid bearer token and attach [`AuthContext`]
/// for the handler. Every configured required scope must be present.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| {
            v.split_once(char::is_whitespace)
                .is_some_and(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        });

    let context = match bearer {
        Some(bearer) => {
            validate(&state.store, &state.settings.default_token_scope, bearer).await
        }
        None => Err(OAuthError::InvalidToken(
            "missing or invalid authorization header".into(),
        )),
    }
    .and_then(|context| require_scopes(&context, &state.settings.required_scopes).map(|_| context));

    match context {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            metrics::record_request("protected", err.code());
            challenge(err, &state.settings)
        }
    }
}

fn require_scopes(context: &AuthContext, required: &[String]) -> OAuthResult<()> {
    match required.iter().find(|s| !context.has_scope(s)) {
        Some(missing) => Err(OAuthError::InsufficientScope(format!(
            "token lacks required scope {missing}"
        ))),
        None => Ok(()),
    }
}

/// Error response whose challenge points at the protected-resource metadata.
fn challenge(err: OAuthError, settings: &Settings) -> Response {
    let header_value = err.bearer_challenge(Some(&settings.resource_metadata_url()));
    let mut response = err.into_response();
    if let Some(value) = header_value {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}
