//! Identifier and secret minting
//!
//! All values come from the thread-local CSPRNG. Prefixes namespace the
//! values as proxy-issued so they are never confused with upstream tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;

/// Prefix for registered client identifiers
pub const CLIENT_ID_PREFIX: &str = "mcp_";

/// Prefix for proxy-issued authorization codes
pub const AUTH_CODE_PREFIX: &str = "mcp_ac_";

/// Prefix for proxy-issued access tokens
pub const ACCESS_TOKEN_PREFIX: &str = "mcp_at_";

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    bytes
}

/// `mcp_` followed by 16 random bytes, hex-encoded (36 chars total).
pub fn new_client_id() -> String {
    format!("{CLIENT_ID_PREFIX}{}", hex::encode(random_bytes::<16>()))
}

/// 32 random bytes, hex-encoded (64 chars).
pub fn new_client_secret() -> String {
    hex::encode(random_bytes::<32>())
}

/// `mcp_ac_` followed by 32 random bytes as URL-safe base64.
pub fn new_authorization_code() -> String {
    format!("{AUTH_CODE_PREFIX}{}", URL_SAFE_NO_PAD.encode(random_bytes::<32>()))
}

/// `mcp_at_` followed by 32 random bytes as URL-safe base64.
pub fn new_access_token() -> String {
    format!(
        "{ACCESS_TOKEN_PREFIX}{}",
        URL_SAFE_NO_PAD.encode(random_bytes::<32>())
    )
}

/// Random key material for signing (e.g. an ephemeral state key).
pub fn new_signing_key() -> Vec<u8> {
    random_bytes::<32>().to_vec()
}
