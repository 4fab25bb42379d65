//! Discovery documents
//!
//! Authorization server metadata (RFC 8414), the OpenID configuration alias
//! some clients probe first, and protected resource metadata (RFC 9728).
//! Every URL derives from the configured public URL.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::config::Settings;
use crate::pkce;

#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub userinfo_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: &'static [&'static str],
    pub grant_types_supported: &'static [&'static str],
    pub token_endpoint_auth_methods_supported: &'static [&'static str],
    pub code_challenge_methods_supported: &'static [&'static str],
    pub subject_types_supported: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub bearer_methods_supported: &'static [&'static str],
    pub resource_name: &'static str,
}

impl AuthorizationServerMetadata {
    pub fn new(settings: &Settings) -> Self {
        Self {
            issuer: settings.issuer.clone(),
            authorization_endpoint: settings.url("/authorize"),
            token_endpoint: settings.url("/token"),
            registration_endpoint: settings.url("/register"),
            userinfo_endpoint: settings.url("/userinfo"),
            scopes_supported: settings.supported_scopes.clone(),
            response_types_supported: &["code"],
            grant_types_supported: &["authorization_code"],
            token_endpoint_auth_methods_supported: &["client_secret_post", "client_secret_basic"],
            code_challenge_methods_supported: pkce::SUPPORTED_METHODS,
            subject_types_supported: &["public"],
        }
    }
}

impl ProtectedResourceMetadata {
    pub fn new(settings: &Settings) -> Self {
        Self {
            resource: settings.issuer.clone(),
            authorization_servers: vec![settings.issuer.clone()],
            scopes_supported: settings.supported_scopes.clone(),
            bearer_methods_supported: &["header"],
            resource_name: "MCP server",
        }
    }
}

/// Serves `/.well-known/oauth-authorization-server`, any path under it, and
/// `/.well-known/openid-configuration`.
pub async fn authorization_server_handler(
    State(state): State<AppState>,
) -> Json<AuthorizationServerMetadata> {
    Json(AuthorizationServerMetadata::new(&state.settings))
}

/// Serves `/.well-known/oauth-protected-resource` and any path under it.
pub async fn protected_resource_handler(
    State(state): State<AppState>,
) -> Json<ProtectedResourceMetadata> {
    Json(ProtectedResourceMetadata::new(&state.settings))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestApp, body_json};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    async fn get_json(app: &TestApp, uri: &str) -> serde_json::Value {
        let response = app
            .router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        body_json(response).await
    }

    #[tokio::test]
    async fn authorization_server_document_points_at_proxy() {
        let app = TestApp::new().await;
        let json = get_json(&app, "/.well-known/oauth-authorization-server").await;
        assert_eq!(json["issuer"], "http://proxy.test");
        assert_eq!(json["authorization_endpoint"], "http://proxy.test/authorize");
        assert_eq!(json["token_endpoint"], "http://proxy.test/token");
        assert_eq!(json["registration_endpoint"], "http://proxy.test/register");
        assert_eq!(json["response_types_supported"], serde_json::json!(["code"]));
        assert_eq!(
            json["grant_types_supported"],
            serde_json::json!(["authorization_code"])
        );
        assert_eq!(
            json["code_challenge_methods_supported"],
            serde_json::json!(["S256", "plain"])
        );
        assert_eq!(json["scopes_supported"], serde_json::json!(["read:user"]));
    }

    #[tokio::test]
    async fn nested_and_openid_paths_serve_the_same_document() {
        let app = TestApp::new().await;
        let base = get_json(&app, "/.well-known/oauth-authorization-server").await;
        for uri in [
            "/.well-known/oauth-authorization-server/mcp",
            "/.well-known/oauth-authorization-server/a/b",
            "/.well-known/openid-configuration",
        ] {
            assert_eq!(get_json(&app, uri).await, base, "{uri}");
        }
    }

    #[tokio::test]
    async fn protected_resource_document_names_proxy_as_server() {
        let app = TestApp::new().await;
        for uri in [
            "/.well-known/oauth-protected-resource",
            "/.well-known/oauth-protected-resource/mcp",
        ] {
            let json = get_json(&app, uri).await;
            assert_eq!(json["resource"], "http://proxy.test");
            assert_eq!(
                json["authorization_servers"],
                serde_json::json!(["http://proxy.test"])
            );
            assert_eq!(json["bearer_methods_supported"], serde_json::json!(["header"]));
        }
    }

    #[tokio::test]
    async fn preflight_is_answered_with_cors_headers() {
        let app = TestApp::new().await;
        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/.well-known/oauth-authorization-server")
                    .header("origin", "https://inspector.example")
                    .header("access-control-request-method", "GET")
                    .header("access-control-request-headers", "mcp-protocol-version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        assert!(allowed.contains("mcp-protocol-version"), "got: {allowed}");
    }
}
