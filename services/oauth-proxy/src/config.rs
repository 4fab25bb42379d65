//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (the upstream client secret and the state signing key) are read
//! from env vars or files, never stored in the TOML directly.

use common::Secret;
use provider::github::{
    DEFAULT_AUTHORIZE_ENDPOINT, DEFAULT_TOKEN_ENDPOINT, DEFAULT_USERINFO_ENDPOINT,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_CLIENT_ID: &str = "GITHUB_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "GITHUB_CLIENT_SECRET";
const ENV_STATE_SECRET: &str = "OAUTH_STATE_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Externally visible base URL; the issuer and every advertised endpoint
    /// derive from it
    pub public_url: String,
    /// Optional separate listener for the admin API
    #[serde(default)]
    pub admin_listen_addr: Option<SocketAddr>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream identity provider (GitHub OAuth App) settings
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to GITHUB_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_authorize_endpoint")]
    pub authorize_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_userinfo_endpoint")]
    pub userinfo_endpoint: String,
    /// Scope the proxy always requests upstream
    #[serde(default = "default_upstream_scope")]
    pub scope: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

/// How the token endpoint treats a `code_verifier`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PkceVerification {
    /// Verify the verifier against the stored challenge (S256 or plain)
    #[default]
    Enforce,
    /// Require a verifier when a challenge was recorded, without checking it
    PresenceOnly,
}

/// Authorization server behaviour
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// When false the credential store lives only in memory
    #[serde(default = "default_true")]
    pub persist: bool,
    #[serde(default = "default_auth_code_ttl")]
    pub auth_code_ttl_secs: u64,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_secs: u64,
    /// Scopes given to a client that registers without any
    #[serde(default = "default_client_scopes")]
    pub default_client_scopes: Vec<String>,
    /// Scopes advertised in discovery documents
    #[serde(default = "default_supported_scopes")]
    pub supported_scopes: Vec<String>,
    /// Scope reported for a token minted without one
    #[serde(default = "default_token_scope")]
    pub default_token_scope: String,
    #[serde(default)]
    pub pkce_verification: PkceVerification,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// How long a signed authorization request may take to come back via `/callback`
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
    #[serde(skip)]
    pub state_secret: Option<Secret<String>>,
    /// Path to a file containing the state signing key (alternative to OAUTH_STATE_SECRET)
    #[serde(default)]
    pub state_secret_file: Option<PathBuf>,
}

/// Protected-resource settings
#[derive(Debug, Deserialize)]
pub struct ResourceConfig {
    /// MCP backend that `/mcp` forwards to; `/mcp` is not mounted when unset
    #[serde(default)]
    pub downstream_url: Option<String>,
    #[serde(default = "default_resource_timeout")]
    pub timeout_secs: u64,
    /// Scopes every bearer token must carry on protected routes
    #[serde(default)]
    pub required_scopes: Vec<String>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_authorize_endpoint() -> String {
    DEFAULT_AUTHORIZE_ENDPOINT.into()
}

fn default_token_endpoint() -> String {
    DEFAULT_TOKEN_ENDPOINT.into()
}

fn default_userinfo_endpoint() -> String {
    DEFAULT_USERINFO_ENDPOINT.into()
}

fn default_upstream_scope() -> String {
    "read:user".into()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".oauth-storage.json")
}

fn default_true() -> bool {
    true
}

fn default_auth_code_ttl() -> u64 {
    600
}

fn default_access_token_ttl() -> u64 {
    3600
}

fn default_client_scopes() -> Vec<String> {
    vec!["read:user".into(), "user:email".into()]
}

fn default_supported_scopes() -> Vec<String> {
    vec!["read:user".into()]
}

fn default_token_scope() -> String {
    "read:user".into()
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_state_ttl() -> u64 {
    600
}

fn default_resource_timeout() -> u64 {
    60
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            client_secret_file: None,
            authorize_endpoint: default_authorize_endpoint(),
            token_endpoint: default_token_endpoint(),
            userinfo_endpoint: default_userinfo_endpoint(),
            scope: default_upstream_scope(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            persist: true,
            auth_code_ttl_secs: default_auth_code_ttl(),
            access_token_ttl_secs: default_access_token_ttl(),
            default_client_scopes: default_client_scopes(),
            supported_scopes: default_supported_scopes(),
            default_token_scope: default_token_scope(),
            pkce_verification: PkceVerification::default(),
            sweep_interval_secs: default_sweep_interval(),
            state_ttl_secs: default_state_ttl(),
            state_secret: None,
            state_secret_file: None,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            downstream_url: None,
            timeout_secs: default_resource_timeout(),
            required_scopes: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse, overlay environment variables, resolve secrets and validate.
    ///
    /// Upstream client id: GITHUB_CLIENT_ID env var, then `upstream.client_id`.
    /// Upstream client secret: GITHUB_CLIENT_SECRET env var, then
    /// `upstream.client_secret_file`. State key: OAUTH_STATE_SECRET env var,
    /// then `oauth.state_secret_file` (absent is allowed).
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(id) = std::env::var(ENV_CLIENT_ID) {
            let id = id.trim();
            if !id.is_empty() {
                config.upstream.client_id = id.to_owned();
            }
        }
        config.upstream.client_secret = Secret::from_env_or_file(
            ENV_CLIENT_SECRET,
            config.upstream.client_secret_file.as_deref(),
        )?;
        config.oauth.state_secret =
            Secret::from_env_or_file(ENV_STATE_SECRET, config.oauth.state_secret_file.as_deref())?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("server.public_url", &self.server.public_url)?;
        require_http_url("upstream.authorize_endpoint", &self.upstream.authorize_endpoint)?;
        require_http_url("upstream.token_endpoint", &self.upstream.token_endpoint)?;
        require_http_url("upstream.userinfo_endpoint", &self.upstream.userinfo_endpoint)?;
        if let Some(ref url) = self.resource.downstream_url {
            require_http_url("resource.downstream_url", url)?;
        }

        for (name, value) in [
            ("server.max_connections", self.server.max_connections as u64),
            ("upstream.timeout_secs", self.upstream.timeout_secs),
            ("oauth.auth_code_ttl_secs", self.oauth.auth_code_ttl_secs),
            ("oauth.access_token_ttl_secs", self.oauth.access_token_ttl_secs),
            ("oauth.sweep_interval_secs", self.oauth.sweep_interval_secs),
            ("oauth.state_ttl_secs", self.oauth.state_ttl_secs),
            ("resource.timeout_secs", self.resource.timeout_secs),
        ] {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.upstream.client_id.is_empty() {
            return Err(common::Error::Config(format!(
                "upstream client id missing: set {ENV_CLIENT_ID} or upstream.client_id"
            )));
        }
        if self.upstream.client_secret.is_none() {
            return Err(common::Error::Config(format!(
                "upstream client secret missing: set {ENV_CLIENT_SECRET} or upstream.client_secret_file"
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("mcp-oauth-proxy.toml")
    }

    /// Public base URL without a trailing slash.
    pub fn issuer(&self) -> &str {
        self.server.public_url.trim_end_matches('/')
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OAuthConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// OAuth behaviour shared by the request handlers, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public base URL without a trailing slash
    pub issuer: String,
    pub auth_code_ttl: Duration,
    pub access_token_ttl: Duration,
    pub default_client_scopes: Vec<String>,
    pub supported_scopes: Vec<String>,
    pub default_token_scope: String,
    pub pkce: PkceVerification,
    pub required_scopes: Vec<String>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.issuer().to_owned(),
            auth_code_ttl: Duration::from_secs(config.oauth.auth_code_ttl_secs),
            access_token_ttl: Duration::from_secs(config.oauth.access_token_ttl_secs),
            default_client_scopes: config.oauth.default_client_scopes.clone(),
            supported_scopes: config.oauth.supported_scopes.clone(),
            default_token_scope: config.oauth.default_token_scope.clone(),
            pkce: config.oauth.pkce_verification,
            required_scopes: config.resource.required_scopes.clone(),
        }
    }

    /// Absolute URL of one of the proxy's own endpoints.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.issuer)
    }

    /// Where the upstream provider sends the user-agent back to.
    pub fn callback_url(&self) -> String {
        self.url("/callback")
    }

    pub fn resource_metadata_url(&self) -> String {
        self.url("/.well-known/oauth-protected-resource")
    }
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| common::Error::Config(format!("{name} is not a valid URL ({value}): {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}
