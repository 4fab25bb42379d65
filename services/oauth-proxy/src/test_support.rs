//! Shared fixtures for router-level tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::response::Response;
use oauth_store::{Client, CredentialStore};
use provider::{IdentityProvider, ProviderError, UpstreamToken};

use crate::AppState;
use crate::build_router;
use crate::config::{PkceVerification, Settings};
use crate::register::{RegistrationRequest, build_client};
use crate::resource::Forwarder;
use crate::state_codec::StateCodec;

/// The only provider code [`FakeProvider`] accepts.
pub const GOOD_UPSTREAM_CODE: &str = "gh-good";

pub const TEST_ISSUER: &str = "http://proxy.test";

/// Provider double that never leaves the process.
pub struct FakeProvider;

impl IdentityProvider for FakeProvider {
    fn id(&self) -> &str {
        "fake"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        let mut url = url::Url::parse("https://github.example/login/oauth/authorize")
            .expect("static URL parses");
        url.query_pairs_mut()
            .append_pair("client_id", "Iv1.test")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "read:user")
            .append_pair("state", state);
        url.into()
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<UpstreamToken>> + Send + 'a>> {
        Box::pin(async move {
            if code == GOOD_UPSTREAM_CODE {
                Ok(UpstreamToken {
                    access_token: "gho_fake".into(),
                    token_type: Some("bearer".into()),
                    scope: Some("read:user".into()),
                })
            } else {
                Err(ProviderError::TokenExchange(
                    "bad_verification_code: The code passed is incorrect or expired.".into(),
                ))
            }
        })
    }

    fn fetch_user<'a>(
        &'a self,
        _access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async { Ok(serde_json::json!({"id": 1, "login": "octocat"})) })
    }
}

/// Provider whose token endpoint never answers in time.
pub struct TimeoutProvider;

impl IdentityProvider for TimeoutProvider {
    fn id(&self) -> &str {
        "timeout"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        FakeProvider.authorization_url(state, redirect_uri)
    }

    fn exchange_code<'a>(
        &'a self,
        _code: &'a str,
        _redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<UpstreamToken>> + Send + 'a>> {
        Box::pin(async {
            Err(ProviderError::Timeout(
                "token exchange: operation timed out".into(),
            ))
        })
    }

    fn fetch_user<'a>(
        &'a self,
        _access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async { Ok(serde_json::json!({"id": 1, "login": "octocat"})) })
    }
}

pub fn test_settings() -> Settings {
    Settings {
        issuer: TEST_ISSUER.into(),
        auth_code_ttl: Duration::from_secs(600),
        access_token_ttl: Duration::from_secs(3600),
        default_client_scopes: vec!["read:user".into(), "user:email".into()],
        supported_scopes: vec!["read:user".into()],
        default_token_scope: "read:user".into(),
        pkce: PkceVerification::Enforce,
        required_scopes: Vec::new(),
    }
}

/// In-memory app wired to [`FakeProvider`].
pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_provider(Arc::new(FakeProvider)).await
    }

    pub async fn with_provider(provider: Arc<dyn IdentityProvider>) -> Self {
        let (_, prometheus) = crate::metrics::tests::isolated_recorder();
        Self {
            state: AppState {
                store: Arc::new(CredentialStore::in_memory().await),
                provider,
                codec: Arc::new(
                    StateCodec::new(b"test-state-key").with_max_age(Duration::from_secs(600)),
                ),
                settings: Arc::new(test_settings()),
                forwarder: None,
                prometheus,
                started_at: Instant::now(),
            },
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), 1000)
    }

    pub fn require_scopes(&mut self, scopes: &[&str]) {
        Arc::make_mut(&mut self.state.settings).required_scopes =
            scopes.iter().map(|s| s.to_string()).collect();
    }

    pub fn forward_to(&mut self, downstream_url: &str, timeout: Duration) {
        self.state.forwarder = Some(Forwarder::new(
            reqwest::Client::new(),
            downstream_url,
            timeout,
        ));
    }

    /// Register a client with a single redirect URI.
    pub async fn register(&self, redirect_uri: &str) -> Client {
        let request = RegistrationRequest {
            client_name: Some("test client".into()),
            redirect_uris: Some(vec![redirect_uri.into()]),
            ..Default::default()
        };
        let client = build_client(request, &self.state.settings.default_client_scopes)
            .expect("valid registration");
        self.state.store.register_client(client.clone()).await;
        client
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
