//! Upstream identity provider abstraction
//!
//! The proxy never authenticates users itself. It redirects them to an
//! upstream provider, trades the provider's authorization code for a
//! provider access token, and fetches the user's profile with it. The
//! `IdentityProvider` trait is the seam for those three interactions;
//! `GitHubProvider` is the concrete implementation.

pub mod github;

pub use github::{GitHubConfig, GitHubProvider};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

/// Errors from upstream provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(String),

    #[error("upstream request failed: {0}")]
    Http(String),

    #[error("upstream request timed out: {0}")]
    Timeout(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("user info request failed: {0}")]
    UserInfo(String),
}

impl ProviderError {
    /// Classify a reqwest transport error, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(context: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(format!("{context}: {e}"))
        } else {
            Self::Http(format!("{context}: {e}"))
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Access token issued by the upstream provider to the proxy.
#[derive(Clone, Deserialize)]
pub struct UpstreamToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Scope the provider actually granted (may differ from what was asked)
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for UpstreamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// An upstream OAuth identity provider.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn IdentityProvider>`), so tests can substitute a provider
/// pointed at a local mock server.
pub trait IdentityProvider: Send + Sync {
    /// Identifier for logs and metrics (e.g. "github")
    fn id(&self) -> &str;

    /// URL to send the user-agent to. `state` is carried through verbatim
    /// and `redirect_uri` is the proxy's own callback.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Trade the provider's authorization code for a provider access token.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamToken>> + Send + 'a>>;

    /// Fetch the authenticated user's profile.
    fn fetch_user<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;
}
