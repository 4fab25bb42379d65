//! The credential store
//!
//! A tokio Mutex guards the in-memory [`Snapshot`]. Each mutation updates
//! the maps and then hands the whole snapshot to the backend while still
//! holding the lock, so concurrent writers cannot interleave file writes.
//! Persistence failures are logged and swallowed: memory stays
//! authoritative and the next successful write catches the file up.

use std::sync::Arc;

use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{MemoryBackend, Snapshot, SnapshotBackend};
use crate::records::{AccessToken, AuthorizationCode, Client, now_millis};

/// Outcome of an atomic authorization code redemption.
#[derive(Debug)]
pub enum Redemption<E> {
    /// No such code (never issued, already redeemed, or swept)
    NotFound,
    /// Code was past its expiry; it has been deleted
    Expired,
    /// The caller's check refused the code; it is left in place
    Rejected(E),
    /// Code passed the check and has been deleted
    Redeemed(AuthorizationCode),
}

/// Entries removed by [`CredentialStore::purge_expired`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub auth_codes: usize,
    pub access_tokens: usize,
}

/// Collection sizes for health and admin reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub clients: usize,
    pub auth_codes: usize,
    pub access_tokens: usize,
}

/// Registered clients, pending authorization codes and issued access tokens.
pub struct CredentialStore {
    backend: Arc<dyn SnapshotBackend>,
    state: Mutex<Snapshot>,
}

impl CredentialStore {
    /// Open the store, loading whatever snapshot the backend holds.
    ///
    /// A missing snapshot is a cold start. An unreadable or corrupt one is
    /// logged and the store starts empty; it is never fatal.
    pub async fn open(backend: Arc<dyn SnapshotBackend>) -> Self {
        let location = backend.describe();
        let state = match backend.load().await {
            Ok(Some(snapshot)) => {
                info!(
                    location,
                    clients = snapshot.clients.len(),
                    auth_codes = snapshot.auth_codes.len(),
                    access_tokens = snapshot.access_tokens.len(),
                    "loaded oauth store snapshot"
                );
                snapshot
            }
            Ok(None) => {
                info!(location, "no oauth store snapshot, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                warn!(location, error = %e, "failed to load oauth store snapshot, starting empty");
                Snapshot::default()
            }
        };

        Self {
            backend,
            state: Mutex::new(state),
        }
    }

    /// A store that never touches disk.
    pub async fn in_memory() -> Self {
        Self::open(Arc::new(MemoryBackend)).await
    }

    async fn persist(&self, state: &mut Snapshot) {
        state.saved_at = now_millis();
        if let Err(e) = self.backend.save(state).await {
            warn!(location = self.backend.describe(), error = %e, "failed to persist oauth store");
        }
    }

    // --- clients ---

    /// Add a client (replacing any client with the same id) and persist.
    pub async fn register_client(&self, client: Client) {
        let mut state = self.state.lock().await;
        debug!(client_id = %client.client_id, client_name = %client.client_name, "storing client");
        state.clients.insert(client.client_id.clone(), client);
        self.persist(&mut state).await;
    }

    pub async fn get_client(&self, client_id: &str) -> Option<Client> {
        let state = self.state.lock().await;
        state.clients.get(client_id).cloned()
    }

    /// Look up a client, checking the secret only when one is supplied.
    ///
    /// Returns `None` for an unknown client or a secret mismatch. The
    /// comparison is constant-time.
    pub async fn validate_client(&self, client_id: &str, secret: Option<&str>) -> Option<Client> {
        let state = self.state.lock().await;
        let client = state.clients.get(client_id)?;
        if let Some(secret) = secret {
            let matches: bool = client
                .client_secret
                .as_bytes()
                .ct_eq(secret.as_bytes())
                .into();
            if !matches {
                debug!(client_id, "client secret mismatch");
                return None;
            }
        }
        Some(client.clone())
    }

    /// All registered clients.
    pub async fn clients(&self) -> Vec<Client> {
        let state = self.state.lock().await;
        state.clients.values().cloned().collect()
    }

    // --- authorization codes ---

    /// Store an authorization code keyed by its `code` and persist.
    pub async fn put_auth_code(&self, record: AuthorizationCode) {
        let mut state = self.state.lock().await;
        state.auth_codes.insert(record.code.clone(), record);
        self.persist(&mut state).await;
    }

    pub async fn get_auth_code(&self, code: &str) -> Option<AuthorizationCode> {
        let state = self.state.lock().await;
        state.auth_codes.get(code).cloned()
    }

    /// Remove an authorization code, persisting only if it existed.
    pub async fn delete_auth_code(&self, code: &str) -> Option<AuthorizationCode> {
        let mut state = self.state.lock().await;
        let removed = state.auth_codes.remove(code);
        if removed.is_some() {
            self.persist(&mut state).await;
        }
        removed
    }

    /// Redeem an authorization code exactly once.
    ///
    /// Under a single lock: a missing code is [`Redemption::NotFound`]; an
    /// expired code is deleted and reported [`Redemption::Expired`]; then
    /// `check` runs against the record and a refusal leaves the code in
    /// place. Only a code that passes is deleted and returned, so two
    /// concurrent redemptions can never both succeed.
    pub async fn redeem_auth_code<E, F>(&self, code: &str, now_ms: u64, check: F) -> Redemption<E>
    where
        F: FnOnce(&AuthorizationCode) -> std::result::Result<(), E>,
    {
        let mut state = self.state.lock().await;
        let Some(record) = state.auth_codes.get(code) else {
            return Redemption::NotFound;
        };

        if record.is_expired(now_ms) {
            state.auth_codes.remove(code);
            self.persist(&mut state).await;
            return Redemption::Expired;
        }

        if let Err(e) = check(record) {
            return Redemption::Rejected(e);
        }

        let Some(record) = state.auth_codes.remove(code) else {
            return Redemption::NotFound;
        };
        self.persist(&mut state).await;
        Redemption::Redeemed(record)
    }

    // --- access tokens ---

    /// Store an access token keyed by its `token` and persist.
    pub async fn put_access_token(&self, record: AccessToken) {
        let mut state = self.state.lock().await;
        state.access_tokens.insert(record.token.clone(), record);
        self.persist(&mut state).await;
    }

    pub async fn get_access_token(&self, token: &str) -> Option<AccessToken> {
        let state = self.state.lock().await;
        state.access_tokens.get(token).cloned()
    }

    /// Remove an access token, persisting only if it existed.
    pub async fn delete_access_token(&self, token: &str) -> Option<AccessToken> {
        let mut state = self.state.lock().await;
        let removed = state.access_tokens.remove(token);
        if removed.is_some() {
            self.persist(&mut state).await;
        }
        removed
    }

    // --- housekeeping ---

    /// Drop every authorization code and access token expired at `now_ms`.
    pub async fn purge_expired(&self, now_ms: u64) -> PurgeReport {
        let mut state = self.state.lock().await;
        let codes_before = state.auth_codes.len();
        let tokens_before = state.access_tokens.len();

        state.auth_codes.retain(|_, c| !c.is_expired(now_ms));
        state.access_tokens.retain(|_, t| !t.is_expired(now_ms));

        let report = PurgeReport {
            auth_codes: codes_before - state.auth_codes.len(),
            access_tokens: tokens_before - state.access_tokens.len(),
        };
        if report != PurgeReport::default() {
            self.persist(&mut state).await;
        }
        report
    }

    pub async fn counts(&self) -> StoreCounts {
        let state = self.state.lock().await;
        StoreCounts {
            clients: state.clients.len(),
            auth_codes: state.auth_codes.len(),
            access_tokens: state.access_tokens.len(),
        }
    }
}
