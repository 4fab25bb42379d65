//! Admin API for inspecting the credential store
//!
//! Runs on a separate listener (`server.admin_listen_addr`) that should only
//! be reachable by operators. Read-only; never returns client secrets,
//! upstream tokens or proxy access tokens.
//!
//! Endpoints:
//! - GET /admin/clients            registered clients without secrets
//! - GET /admin/auth-codes/{code}  whether a pending code exists and for whom
//! - GET /admin/store              collection sizes

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use oauth_store::{Client, CredentialStore, now_millis};
use tracing::debug;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    store: Arc<CredentialStore>,
}

impl AdminState {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/clients", get(list_clients))
        .route("/admin/auth-codes/{code}", get(inspect_auth_code))
        .route("/admin/store", get(store_status))
        .with_state(state)
}

fn client_summary(client: &Client) -> serde_json::Value {
    serde_json::json!({
        "client_id": client.client_id,
        "client_name": client.client_name,
        "redirect_uris": client.redirect_uris,
        "grant_types": client.grant_types,
        "response_types": client.response_types,
        "scopes": client.scopes,
        "created_at": client.created_at,
    })
}

/// GET /admin/clients
async fn list_clients(State(state): State<AdminState>) -> impl IntoResponse {
    let mut clients = state.store.clients().await;
    clients.sort_by_key(|c| c.created_at);
    let clients: Vec<_> = clients.iter().map(client_summary).collect();

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "clients": clients })),
    )
}

/// GET /admin/auth-codes/{code}. Unknown codes are a 404 with `found: false`.
async fn inspect_auth_code(
    State(state): State<AdminState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    debug!("admin auth code lookup");
    match state.store.get_auth_code(&code).await {
        Some(record) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "found": true,
                "client_id": record.client_id,
                "redirect_uri": record.redirect_uri,
                "scope": record.scope,
                "expires_at": record.expires_at,
                "expired": record.is_expired(now_millis()),
                "pkce": record.code_challenge.is_some(),
            })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({ "found": false })),
        ),
    }
}

/// GET /admin/store
async fn store_status(State(state): State<AdminState>) -> impl IntoResponse {
    (StatusCode::OK, axum::Json(state.store.counts().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use oauth_store::AuthorizationCode;
    use tower::ServiceExt;

    fn client(id: &str, created_at: u64) -> Client {
        Client {
            client_id: id.into(),
            client_secret: format!("{id}-secret"),
            client_name: "t".into(),
            redirect_uris: vec!["https://x/cb".into()],
            grant_types: vec!["authorization_code".into()],
            response_types: vec!["code".into()],
            scopes: vec!["read:user".into()],
            created_at,
        }
    }

    async fn get_json(store: Arc<CredentialStore>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = build_admin_router(AdminState::new(store))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn list_clients_empty_store() {
        let store = Arc::new(CredentialStore::in_memory().await);
        let (status, json) = get_json(store, "/admin/clients").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["clients"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn list_clients_never_exposes_secrets() {
        let store = Arc::new(CredentialStore::in_memory().await);
        store.register_client(client("mcp_b", 20)).await;
        store.register_client(client("mcp_a", 10)).await;

        let (_, json) = get_json(store, "/admin/clients").await;
        let clients = json["clients"].as_array().unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0]["client_id"], "mcp_a");
        assert_eq!(clients[1]["client_id"], "mcp_b");
        assert!(clients.iter().all(|c| c.get("client_secret").is_none()));
        assert!(!json.to_string().contains("-secret"));
    }

    #[tokio::test]
    async fn auth_code_lookup_hides_upstream_token() {
        let store = Arc::new(CredentialStore::in_memory().await);
        store
            .put_auth_code(AuthorizationCode {
                code: "mcp_ac_1".into(),
                client_id: "mcp_a".into(),
                upstream_access_token: "gho_secret".into(),
                user: serde_json::json!({"login": "octocat"}),
                scope: None,
                code_challenge: Some("c".into()),
                code_challenge_method: Some("S256".into()),
                redirect_uri: "https://x/cb".into(),
                resource: None,
                expires_at: u64::MAX,
            })
            .await;

        let (status, json) = get_json(store.clone(), "/admin/auth-codes/mcp_ac_1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["found"], true);
        assert_eq!(json["client_id"], "mcp_a");
        assert_eq!(json["redirect_uri"], "https://x/cb");
        assert_eq!(json["expired"], false);
        assert_eq!(json["pkce"], true);
        assert!(!json.to_string().contains("gho_secret"));

        let (status, json) = get_json(store, "/admin/auth-codes/mcp_ac_missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["found"], false);
    }

    #[tokio::test]
    async fn store_status_reports_counts() {
        let store = Arc::new(CredentialStore::in_memory().await);
        store.register_client(client("mcp_a", 1)).await;

        let (status, json) = get_json(store, "/admin/store").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["clients"], 1);
        assert_eq!(json["auth_codes"], 0);
        assert_eq!(json["access_tokens"], 0);
    }
}
