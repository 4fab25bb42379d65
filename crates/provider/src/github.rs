//! GitHub OAuth App provider
//!
//! GitHub's token endpoint answers `200 OK` with an `error` field for most
//! failures (bad or reused code, wrong redirect URI), so success is decided
//! by the body, not the status.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{IdentityProvider, ProviderError, Result, UpstreamToken};

pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
pub const DEFAULT_USERINFO_ENDPOINT: &str = "https://api.github.com/user";

const GITHUB_JSON: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("mcp-oauth-proxy/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body folded into an error message
const MAX_ERROR_BODY: usize = 512;

/// Settings for a GitHub OAuth App.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    /// Fixed scope requested upstream regardless of what the client asked for
    pub scope: String,
    /// Bound on each upstream request
    pub timeout: Duration,
}

pub struct GitHubProvider {
    config: GitHubConfig,
    authorize_url: Url,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let authorize_url = Url::parse(&config.authorize_endpoint)
            .map_err(|e| ProviderError::Config(format!("authorize_endpoint: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            config,
            authorize_url,
            http,
        })
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<UpstreamToken> {
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose().as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("token exchange", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest("reading token response", e))?;

        if !status.is_success() {
            return Err(ProviderError::TokenExchange(format!(
                "token endpoint returned {status}: {}",
                truncate(&body)
            )));
        }

        let parsed: TokenEndpointResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::TokenExchange(format!("invalid token response: {e}")))?;

        if let Some(error) = parsed.error {
            let detail = parsed.error_description.unwrap_or_default();
            return Err(ProviderError::TokenExchange(if detail.is_empty() {
                error
            } else {
                format!("{error}: {detail}")
            }));
        }

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProviderError::TokenExchange("no access token in token response".into())
            })?;

        debug!(scope = ?parsed.scope, "upstream token exchange succeeded");
        Ok(UpstreamToken {
            access_token,
            token_type: parsed.token_type,
            scope: parsed.scope,
        })
    }

    async fn user(&self, access_token: &str) -> Result<serde_json::Value> {
        let response = self
            .http
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .header(ACCEPT, GITHUB_JSON)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest("user info", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(ProviderError::UserInfo(format!(
                "user endpoint returned {status}: {}",
                truncate(&body)
            )));
        }

        let user: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::UserInfo(format!("invalid user response: {e}")))?;
        if !user.is_object() {
            return Err(ProviderError::UserInfo("user response is not an object".into()));
        }
        Ok(user)
    }
}

impl IdentityProvider for GitHubProvider {
    fn id(&self) -> &str {
        "github"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state);
        url.into()
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamToken>> + Send + 'a>> {
        Box::pin(self.exchange(code, redirect_uri))
    }

    fn fetch_user<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.user(access_token))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use std::collections::HashMap;

    fn config(base: &str) -> GitHubConfig {
        GitHubConfig {
            client_id: "Iv1.test".into(),
            client_secret: Secret::new("gh-secret".into()),
            authorize_endpoint: DEFAULT_AUTHORIZE_ENDPOINT.into(),
            token_endpoint: format!("{base}/login/oauth/access_token"),
            userinfo_endpoint: format!("{base}/user"),
            scope: "read:user".into(),
            timeout: Duration::from_secs(5),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn authorization_url_carries_fixed_scope_and_state() {
        let provider = GitHubProvider::new(config("http://unused")).unwrap();
        let url = provider.authorization_url("abc.def", "https://proxy.example/callback");
        let parsed = Url::parse(&url).unwrap();
        let params: HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with(DEFAULT_AUTHORIZE_ENDPOINT));
        assert_eq!(params["client_id"], "Iv1.test");
        assert_eq!(params["redirect_uri"], "https://proxy.example/callback");
        assert_eq!(params["scope"], "read:user");
        assert_eq!(params["state"], "abc.def");
    }

    #[test]
    fn rejects_unparseable_authorize_endpoint() {
        let mut cfg = config("http://unused");
        cfg.authorize_endpoint = "not a url".into();
        assert!(matches!(
            GitHubProvider::new(cfg),
            Err(ProviderError::Config(_))
        ));
    }

    #[tokio::test]
    async fn exchange_posts_credentials_and_parses_token() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(
                |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    assert_eq!(headers["accept"], "application/json");
                    assert_eq!(form["client_id"], "Iv1.test");
                    assert_eq!(form["client_secret"], "gh-secret");
                    assert_eq!(form["code"], "gh-code");
                    assert_eq!(form["redirect_uri"], "https://proxy.example/callback");
                    axum::Json(serde_json::json!({
                        "access_token": "gho_abc",
                        "token_type": "bearer",
                        "scope": "read:user"
                    }))
                },
            ),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        let token = provider
            .exchange_code("gh-code", "https://proxy.example/callback")
            .await
            .unwrap();
        assert_eq!(token.access_token, "gho_abc");
        assert_eq!(token.scope.as_deref(), Some("read:user"));
    }

    #[tokio::test]
    async fn exchange_surfaces_error_in_ok_body() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(|| async {
                axum::Json(serde_json::json!({
                    "error": "bad_verification_code",
                    "error_description": "The code passed is incorrect or expired."
                }))
            }),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        let err = provider.exchange_code("stale", "https://x/cb").await.unwrap_err();
        match err {
            ProviderError::TokenExchange(msg) => {
                assert!(msg.contains("bad_verification_code"), "got: {msg}");
                assert!(msg.contains("incorrect or expired"), "got: {msg}");
            }
            other => panic!("expected TokenExchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_surfaces_status_and_body() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        let err = provider.exchange_code("c", "https://x/cb").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("maintenance"), "got: {msg}");
    }

    #[tokio::test]
    async fn exchange_without_access_token_is_an_error() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(|| async { axum::Json(serde_json::json!({"token_type": "bearer"})) }),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        assert!(matches!(
            provider.exchange_code("c", "https://x/cb").await,
            Err(ProviderError::TokenExchange(_))
        ));
    }

    #[tokio::test]
    async fn fetch_user_sends_bearer_and_github_accept() {
        let app = Router::new().route(
            "/user",
            get(|headers: HeaderMap| async move {
                assert_eq!(headers["authorization"], "Bearer gho_abc");
                assert_eq!(headers["accept"], GITHUB_JSON);
                assert!(
                    headers["user-agent"]
                        .to_str()
                        .unwrap()
                        .starts_with("mcp-oauth-proxy/")
                );
                axum::Json(serde_json::json!({"id": 583231, "login": "octocat"}))
            }),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        let user = provider.fetch_user("gho_abc").await.unwrap();
        assert_eq!(user["login"], "octocat");
    }

    #[tokio::test]
    async fn fetch_user_rejects_unauthorized() {
        let app = Router::new().route(
            "/user",
            get(|| async { (StatusCode::UNAUTHORIZED, "Bad credentials") }),
        );
        let base = serve(app).await;
        let provider = GitHubProvider::new(config(&base)).unwrap();

        let err = provider.fetch_user("gho_revoked").await.unwrap_err();
        assert!(matches!(err, ProviderError::UserInfo(ref m) if m.contains("401")));
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        // Port 1 is never listening
        let provider = GitHubProvider::new(config("http://127.0.0.1:1")).unwrap();
        assert!(matches!(
            provider.exchange_code("c", "https://x/cb").await,
            Err(ProviderError::Http(_))
        ));
    }

    #[tokio::test]
    async fn slow_token_endpoint_is_a_timeout() {
        let app = Router::new().route(
            "/login/oauth/access_token",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(serde_json::json!({"access_token": "gho_late"}))
            }),
        );
        let base = serve(app).await;
        let mut cfg = config(&base);
        cfg.timeout = Duration::from_millis(200);
        let provider = GitHubProvider::new(cfg).unwrap();

        let started = std::time::Instant::now();
        let err = provider.exchange_code("c", "https://x/cb").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)), "got: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn truncate_limits_long_bodies() {
        let long = "x".repeat(MAX_ERROR_BODY * 2);
        assert_eq!(truncate(&long).len(), MAX_ERROR_BODY);
        assert_eq!(truncate("short"), "short");
    }
}
