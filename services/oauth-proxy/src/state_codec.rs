//! Authorization request state carried through the upstream redirect
//!
//! The `state` parameter handed to the upstream provider is
//! `base64url(json) "." base64url(hmac_sha256(key, base64url(json)))`.
//! Decoding checks the MAC in constant time before looking at the payload,
//! then the schema version and age, so a tampered, outdated or replayed
//! blob is a decode error.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::time::Duration;

use common::Secret;
use hmac::{Hmac, Mac};
use oauth_store::now_millis;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Current payload schema version
pub const STATE_VERSION: u32 = 1;

/// Parameters of an inbound `/authorize` request, replayed at `/callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequestState {
    pub v: u32,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    /// The client's own `state`, returned to it unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Unix milliseconds when the authorization request arrived
    pub issued_at: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("state is not in signed form")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state payload could not be decoded: {0}")]
    Payload(String),
    #[error("unsupported state version {0}")]
    Version(u32),
    #[error("state expired {0}ms ago")]
    Expired(u64),
}

/// Signs and verifies state blobs with a single HMAC key.
pub struct StateCodec {
    key: Secret<Vec<u8>>,
    /// Oldest `issued_at` accepted by [`StateCodec::decode`]; unbounded when unset
    max_age: Option<Duration>,
}

impl StateCodec {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: Secret::new(key.to_vec()),
            max_age: None,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    fn mac(&self, payload: &str) -> Vec<u8> {
        let mut mac = match HmacSha256::new_from_slice(self.key.expose()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        };
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    pub fn encode(&self, state: &AuthorizationRequestState) -> String {
        // Serializing a struct of strings and integers cannot fail
        let json = serde_json::to_vec(state).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload));
        format!("{payload}.{signature}")
    }

    pub fn decode(&self, blob: &str) -> Result<AuthorizationRequestState, StateError> {
        self.decode_at(blob, now_millis())
    }

    /// Decode as of `now_ms` (Unix milliseconds).
    pub fn decode_at(
        &self,
        blob: &str,
        now_ms: u64,
    ) -> Result<AuthorizationRequestState, StateError> {
        let (payload, signature) = blob.split_once('.').ok_or(StateError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StateError::Malformed)?;

        let expected = self.mac(payload);
        if !bool::from(expected.ct_eq(&signature)) {
            return Err(StateError::BadSignature);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| StateError::Payload(e.to_string()))?;

        let version: Versioned =
            serde_json::from_slice(&json).map_err(|e| StateError::Payload(e.to_string()))?;
        if version.v != STATE_VERSION {
            return Err(StateError::Version(version.v));
        }

        let state: AuthorizationRequestState =
            serde_json::from_slice(&json).map_err(|e| StateError::Payload(e.to_string()))?;

        if let Some(max_age) = self.max_age {
            let deadline = state.issued_at.saturating_add(max_age.as_millis() as u64);
            if now_ms > deadline {
                return Err(StateError::Expired(now_ms - deadline));
            }
        }
        Ok(state)
    }
}

#[derive(Deserialize)]
struct Versioned {
    v: u32,
}
