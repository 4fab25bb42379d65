//! MCP OAuth Proxy
//!
//! Single-binary Rust service that:
//! 1. Registers MCP clients dynamically and acts as their authorization server
//! 2. Delegates user login to GitHub and captures the user's identity
//! 3. Issues its own authorization codes and access tokens
//! 4. Validates those tokens on protected routes and forwards `/mcp` traffic

mod admin;
mod authorize;
mod callback;
mod config;
mod error;
mod metadata;
mod metrics;
mod pkce;
mod redirect;
mod register;
mod resource;
mod state_codec;
mod sweep;
mod token;
mod validator;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderName, Method, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use oauth_store::{CredentialStore, FileBackend, MemoryBackend, SnapshotBackend, ids};
use provider::{GitHubConfig, GitHubProvider, IdentityProvider};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::admin::AdminState;
use crate::config::{Config, Settings};
use crate::resource::Forwarder;
use crate::state_codec::StateCodec;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub provider: Arc<dyn IdentityProvider>,
    pub codec: Arc<StateCodec>,
    pub settings: Arc<Settings>,
    /// Present when `resource.downstream_url` is configured
    pub forwarder: Option<Forwarder>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Cross-origin access for browser-based MCP clients and inspectors.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("mcp-protocol-version"),
        ])
        .expose_headers([header::WWW_AUTHENTICATE])
}

/// Build the public router.
///
/// Routes behind [`validator::require_bearer`] are grouped separately so the
/// bearer check runs only for them. `/mcp` is mounted only with a forwarder.
fn build_router(state: AppState, max_connections: usize) -> Router {
    let mut protected = Router::new().route("/userinfo", get(resource::userinfo_handler));
    if state.forwarder.is_some() {
        protected = protected
            .route("/mcp", any(resource::mcp_handler))
            .route("/mcp/{*path}", any(resource::mcp_handler));
    }
    let protected = protected.route_layer(middleware::from_fn_with_state(
        state.clone(),
        validator::require_bearer,
    ));

    Router::new()
        .route("/register", post(register::register_handler))
        .route("/authorize", get(authorize::authorize_handler))
        .route("/callback", get(callback::callback_handler))
        .route("/token", post(token::token_handler))
        .route(
            "/.well-known/oauth-authorization-server",
            get(metadata::authorization_server_handler),
        )
        .route(
            "/.well-known/oauth-authorization-server/{*path}",
            get(metadata::authorization_server_handler),
        )
        .route(
            "/.well-known/openid-configuration",
            get(metadata::authorization_server_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(metadata::protected_resource_handler),
        )
        .route(
            "/.well-known/oauth-protected-resource/{*path}",
            get(metadata::protected_resource_handler),
        )
        .merge(protected)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting mcp-oauth-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        issuer = config.issuer(),
        upstream_client_id = %config.upstream.client_id,
        persist = config.oauth.persist,
        pkce = ?config.oauth.pkce_verification,
        downstream = ?config.resource.downstream_url,
        "configuration loaded"
    );

    let settings = Arc::new(Settings::from_config(&config));

    let state_key = match &config.oauth.state_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            warn!(
                "no state secret configured; using a random per-process key, \
                 authorizations in flight will not survive a restart"
            );
            ids::new_signing_key()
        }
    };

    let backend: Arc<dyn SnapshotBackend> = if config.oauth.persist {
        Arc::new(FileBackend::new(&config.oauth.storage_path))
    } else {
        Arc::new(MemoryBackend)
    };
    let store = Arc::new(CredentialStore::open(backend).await);
    metrics::set_store_entries(store.counts().await);

    let client_secret = config
        .upstream
        .client_secret
        .clone()
        .context("upstream client secret missing")?;
    let provider = GitHubProvider::new(GitHubConfig {
        client_id: config.upstream.client_id.clone(),
        client_secret,
        authorize_endpoint: config.upstream.authorize_endpoint.clone(),
        token_endpoint: config.upstream.token_endpoint.clone(),
        userinfo_endpoint: config.upstream.userinfo_endpoint.clone(),
        scope: config.upstream.scope.clone(),
        timeout: config.upstream.timeout(),
    })
    .context("failed to build GitHub provider")?;

    let forwarder = config.resource.downstream_url.as_deref().map(|url| {
        Forwarder::new(
            reqwest::Client::new(),
            url,
            Duration::from_secs(config.resource.timeout_secs),
        )
    });

    let app_state = AppState {
        store: store.clone(),
        provider: Arc::new(provider),
        codec: Arc::new(
            StateCodec::new(&state_key).with_max_age(config.oauth.state_ttl()),
        ),
        settings,
        forwarder,
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let sweep_task = sweep::spawn_sweep_task(
        store.clone(),
        Duration::from_secs(config.oauth.sweep_interval_secs),
    );

    // Admin API on its own listener, reachable only where the operator binds it
    if let Some(admin_addr) = config.server.admin_listen_addr {
        let admin_listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;
        let admin_app = admin::build_admin_router(AdminState::new(store.clone()));
        info!(addr = %admin_addr, "admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_app).await {
                error!(error = %e, "admin server failed");
            }
        });
    }

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, issuer = config.issuer(), "accepting requests");

    // The drain timeout starts when the shutdown signal fires: the server is
    // told to drain, then the drain races the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());
    sweep_task.abort();

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Liveness plus credential store sizes.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.store.counts().await;
    axum::Json(serde_json::json!({
        "status": "healthy",
        "provider": state.provider.id(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "store": counts,
    }))
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
