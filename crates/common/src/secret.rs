//! Secret wrapper for sensitive values
//!
//! Upstream client secrets and the state signing key flow through this type
//! so they never reach logs. Resolution follows one rule everywhere: an
//! environment variable wins over a file, and a blank file counts as unset.

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value - redacted in Debug/Display/logs
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Resolve a string secret from `env_var`, falling back to `file`.
    ///
    /// Returns `Ok(None)` when neither source yields a non-blank value.
    /// A configured file that cannot be read is an error rather than a
    /// silent fallthrough.
    pub fn from_env_or_file(env_var: &str, file: Option<&Path>) -> Result<Option<Self>> {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim().to_owned();
            if !value.is_empty() {
                return Ok(Some(Self::new(value)));
            }
        }

        let Some(path) = file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Secret(format!("failed to read {}: {e}", path.display()))
        })?;
        let value = contents.trim().to_owned();
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(value)))
    }

    /// Raw bytes of the secret, e.g. for use as a MAC key.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("gho_client_secret"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("gho_client_secret"));
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("gho_client_secret"));
        assert_eq!(secret.expose(), "gho_client_secret");
        assert_eq!(secret.as_bytes(), b"gho_client_secret");
    }

    #[test]
    fn env_var_wins_over_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "from-file").unwrap();

        unsafe { std::env::set_var("COMMON_TEST_SECRET_A", "from-env") };
        let secret = Secret::from_env_or_file("COMMON_TEST_SECRET_A", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "from-env");
        unsafe { std::env::remove_var("COMMON_TEST_SECRET_A") };
    }

    #[test]
    fn file_is_trimmed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, "  from-file\n").unwrap();

        unsafe { std::env::remove_var("COMMON_TEST_SECRET_B") };
        let secret = Secret::from_env_or_file("COMMON_TEST_SECRET_B", Some(&path))
            .unwrap()
            .unwrap();
        assert_eq!(secret.expose(), "from-file");
    }

    #[test]
    fn blank_file_and_no_env_is_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        std::fs::write(&path, " \n\t").unwrap();

        unsafe { std::env::remove_var("COMMON_TEST_SECRET_C") };
        let resolved = Secret::from_env_or_file("COMMON_TEST_SECRET_C", Some(&path)).unwrap();
        assert!(resolved.is_none());

        let resolved = Secret::from_env_or_file("COMMON_TEST_SECRET_C", None).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { std::env::remove_var("COMMON_TEST_SECRET_D") };
        let result = Secret::from_env_or_file(
            "COMMON_TEST_SECRET_D",
            Some(Path::new("/nonexistent/secret/file")),
        );
        assert!(matches!(result, Err(Error::Secret(_))));
    }
}
