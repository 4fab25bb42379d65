//! PKCE (Proof Key for Code Exchange) verification per RFC 7636
//!
//! The proxy never forwards the client's challenge upstream; it records the
//! challenge with the authorization code and checks the verifier when the
//! code is redeemed.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::PkceVerification;
use crate::error::OAuthError;

pub const METHOD_S256: &str = "S256";
pub const METHOD_PLAIN: &str = "plain";

/// Methods advertised in discovery metadata
pub const SUPPORTED_METHODS: &[&str] = &[METHOD_S256, METHOD_PLAIN];

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Whether `method` is one the proxy can verify. A missing method means `plain`.
pub fn is_supported_method(method: Option<&str>) -> bool {
    matches!(method, None | Some(METHOD_S256) | Some(METHOD_PLAIN))
}

/// Check a presented `code_verifier` against the challenge stored with the code.
///
/// No stored challenge means PKCE was not used and anything passes. With a
/// stored challenge a verifier is always required; whether its value is
/// checked depends on `mode`.
pub fn check(
    mode: PkceVerification,
    challenge: Option<&str>,
    method: Option<&str>,
    verifier: Option<&str>,
) -> Result<(), OAuthError> {
    let Some(challenge) = challenge else {
        return Ok(());
    };
    let Some(verifier) = verifier.filter(|v| !v.is_empty()) else {
        return Err(OAuthError::InvalidRequest(
            "code_verifier required for PKCE".into(),
        ));
    };

    if mode == PkceVerification::PresenceOnly {
        return Ok(());
    }

    let derived = match method.unwrap_or(METHOD_PLAIN) {
        METHOD_S256 => compute_challenge(verifier),
        METHOD_PLAIN => verifier.to_owned(),
        other => {
            return Err(OAuthError::InvalidGrant(format!(
                "unsupported code_challenge_method: {other}"
            )));
        }
    };

    if bool::from(derived.as_bytes().ct_eq(challenge.as_bytes())) {
        Ok(())
    } else {
        Err(OAuthError::InvalidGrant(
            "code_verifier does not match code_challenge".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mJ92K9qYHDEQ1_Ye9ADdN3rYSTc_SM";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn challenge_matches_rfc_example() {
        assert_eq!(compute_challenge(RFC_VERIFIER), RFC_CHALLENGE);
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") as base64url
        assert_eq!(
            compute_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn no_challenge_means_no_pkce() {
        for mode in [PkceVerification::Enforce, PkceVerification::PresenceOnly] {
            assert!(check(mode, None, None, None).is_ok());
            assert!(check(mode, None, None, Some("anything")).is_ok());
        }
    }

    #[test]
    fn missing_verifier_is_invalid_request_in_both_modes() {
        for mode in [PkceVerification::Enforce, PkceVerification::PresenceOnly] {
            let err = check(mode, Some(RFC_CHALLENGE), Some("S256"), None).unwrap_err();
            assert_eq!(err.code(), "invalid_request");
            let err = check(mode, Some(RFC_CHALLENGE), Some("S256"), Some("")).unwrap_err();
            assert_eq!(err.code(), "invalid_request");
        }
    }

    #[test]
    fn enforce_verifies_s256() {
        let mode = PkceVerification::Enforce;
        assert!(check(mode, Some(RFC_CHALLENGE), Some("S256"), Some(RFC_VERIFIER)).is_ok());
        let err = check(mode, Some(RFC_CHALLENGE), Some("S256"), Some("wrong")).unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[test]
    fn enforce_verifies_plain_and_defaults_to_plain() {
        let mode = PkceVerification::Enforce;
        assert!(check(mode, Some("abc"), Some("plain"), Some("abc")).is_ok());
        assert!(check(mode, Some("abc"), None, Some("abc")).is_ok());
        assert!(check(mode, Some("abc"), None, Some("abd")).is_err());
    }

    #[test]
    fn enforce_rejects_unknown_method() {
        let err = check(
            PkceVerification::Enforce,
            Some("abc"),
            Some("S512"),
            Some("abc"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_grant");
    }

    #[test]
    fn presence_only_accepts_any_verifier() {
        assert!(
            check(
                PkceVerification::PresenceOnly,
                Some(RFC_CHALLENGE),
                Some("S256"),
                Some("not-the-verifier"),
            )
            .is_ok()
        );
    }

    #[test]
    fn supported_methods() {
        assert!(is_supported_method(None));
        assert!(is_supported_method(Some("S256")));
        assert!(is_supported_method(Some("plain")));
        assert!(!is_supported_method(Some("s256")));
    }
}
