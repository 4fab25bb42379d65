//! Prometheus metrics exposition
//!
//! - `oauth_requests_total` (counter): labels `endpoint`, `outcome`
//!   (`ok`, `redirect_error`, or an OAuth error code)
//! - `oauth_upstream_request_duration_seconds` (histogram): label `call`
//! - `oauth_upstream_errors_total` (counter): label `call`
//! - `oauth_store_entries` (gauge): label `kind`

use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use oauth_store::StoreCounts;

use crate::error::OAuthResult;

const UPSTREAM_DURATION: &str = "oauth_upstream_request_duration_seconds";

/// Bucket boundaries from 5ms to 60s, covering the upstream and downstream
/// timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(UPSTREAM_DURATION.to_string()), DURATION_BUCKETS)
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Histograms render with `_bucket` lines so `histogram_quantile()` works.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one call to a public endpoint.
pub fn record_request(endpoint: &'static str, outcome: &str) {
    metrics::counter!("oauth_requests_total", "endpoint" => endpoint, "outcome" => outcome.to_string())
        .increment(1);
}

/// Record the result of an endpoint and render it as a response.
pub fn observe(endpoint: &'static str, result: OAuthResult<Response>) -> Response {
    match result {
        Ok(response) => {
            record_request(endpoint, "ok");
            response
        }
        Err(e) => {
            record_request(endpoint, e.code());
            e.into_response()
        }
    }
}

/// Record an outbound call to the upstream provider or downstream server.
pub fn record_upstream(call: &'static str, duration_secs: f64, ok: bool) {
    metrics::histogram!(UPSTREAM_DURATION, "call" => call).record(duration_secs);
    if !ok {
        metrics::counter!("oauth_upstream_errors_total", "call" => call).increment(1);
    }
}

/// Publish credential store collection sizes.
pub fn set_store_entries(counts: StoreCounts) {
    metrics::gauge!("oauth_store_entries", "kind" => "clients").set(counts.clients as f64);
    metrics::gauge!("oauth_store_entries", "kind" => "auth_codes").set(counts.auth_codes as f64);
    metrics::gauge!("oauth_store_entries", "kind" => "access_tokens")
        .set(counts.access_tokens as f64);
}
