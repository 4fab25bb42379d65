//! Redirect responses
//!
//! OAuth redirects use `302 Found`; axum's `Redirect::to` answers 303.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::error::OAuthError;

/// `302 Found` to `location`, never cached.
pub fn found(location: &str) -> Response {
    let Ok(value) = HeaderValue::from_str(location) else {
        return OAuthError::ServerError("redirect target is not a valid header value".into())
            .into_response();
    };
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, value),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
    )
        .into_response()
}

/// Append query parameters to `base`, keeping any query it already has.
/// `None` values are skipped.
pub fn with_params(base: &str, params: &[(&str, Option<&str>)]) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
    }
    Ok(url.into())
}
