//! Protected resource routes
//!
//! Everything here sits behind [`crate::validator::require_bearer`], so
//! handlers can rely on an [`AuthContext`] extension.
//!
//! `/mcp` forwards to the downstream MCP server. The proxy bearer token is
//! stripped and the caller's identity travels in `x-mcp-*` headers instead;
//! the downstream never sees a credential it could replay.

use std::time::{Duration, Instant};

use axum::Extension;
use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, instrument, warn};

use crate::AppState;
use crate::metrics;
use crate::validator::AuthContext;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const CLIENT_ID_HEADER: &str = "x-mcp-client-id";
pub const SCOPES_HEADER: &str = "x-mcp-scopes";
pub const USER_HEADER: &str = "x-mcp-user";

/// `GET /userinfo`: the identity behind the presented token.
pub async fn userinfo_handler(Extension(context): Extension<AuthContext>) -> Json<AuthContext> {
    metrics::record_request("userinfo", "ok");
    Json(context)
}

/// Forwards authenticated requests to the downstream MCP server
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    downstream_url: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, downstream_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            downstream_url: downstream_url.trim_end_matches('/').to_owned(),
            timeout,
        }
    }

    /// Forward one request. No retries: a request may not be idempotent.
    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
    pub async fn forward(
        &self,
        request: Request,
        context: &AuthContext,
        request_id: &str,
    ) -> Response {
        let method = request.method().clone();
        let target = match request.uri().path_and_query() {
            Some(pq) => format!("{}{}", self.downstream_url, pq),
            None => self.downstream_url.clone(),
        };

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in request.headers() {
            if !is_hop_by_hop(name.as_str())
                && name != header::AUTHORIZATION
                && name != header::HOST
            {
                headers.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in identity_headers(context) {
            headers.insert(name, value);
        }

        let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to read request body");
                metrics::record_request("mcp", "invalid_body");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid request body: {e}"),
                    request_id,
                );
            }
        };

        let started = Instant::now();
        let result = self
            .client
            .request(method, &target)
            .headers(headers)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await;
        metrics::record_upstream("downstream", started.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(downstream) => {
                metrics::record_request("mcp", "ok");
                let mut response = Response::builder().status(downstream.status());
                for (name, value) in downstream.headers() {
                    if !is_hop_by_hop(name.as_str()) {
                        response = response.header(name, value);
                    }
                }
                // Streamed so server-sent events reach the client as they arrive
                response
                    .body(Body::from_stream(downstream.bytes_stream()))
                    .unwrap_or_else(|e| {
                        error_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            &format!("response build error: {e}"),
                            request_id,
                        )
                    })
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, timeout_secs = self.timeout.as_secs(), "downstream timeout");
                metrics::record_request("mcp", "timeout");
                error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    &format!("downstream timeout after {}s", self.timeout.as_secs()),
                    request_id,
                )
            }
            Err(e) => {
                error!(error = %e, "downstream request failed");
                metrics::record_request("mcp", "bad_gateway");
                error_response(
                    StatusCode::BAD_GATEWAY,
                    &format!("downstream error: {e}"),
                    request_id,
                )
            }
        }
    }
}

/// `ANY /mcp` and `/mcp/{*path}`
pub async fn mcp_handler(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    request: Request,
) -> Response {
    let Some(forwarder) = state.forwarder.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    forwarder.forward(request, &context, &request_id).await
}

/// Identity headers for the downstream. Values that cannot be carried in a
/// header are left out.
fn identity_headers(context: &AuthContext) -> Vec<(HeaderName, HeaderValue)> {
    let user = match context.user.get("login").and_then(|l| l.as_str()) {
        Some(login) => login.to_owned(),
        None => context
            .user
            .get("id")
            .map(|id| id.to_string())
            .unwrap_or_default(),
    };

    [
        (CLIENT_ID_HEADER, context.client_id.clone()),
        (SCOPES_HEADER, context.scopes.join(" ")),
        (USER_HEADER, user),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        let value = HeaderValue::from_str(&value).ok()?;
        Some((HeaderName::from_static(name), value))
    })
    .collect()
}

/// JSON error body: {"error":{"type":"proxy_error","message":"...","request_id":"req_..."}}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": "proxy_error",
            "message": message,
            "request_id": request_id,
        }
    });
    (status, Json(body)).into_response()
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
