//! Credential store for the MCP OAuth proxy
//!
//! Owns the three collections the authorization flow reads and writes:
//! registered clients, pending authorization codes, and issued access
//! tokens. Every other component goes through [`CredentialStore`]; nothing
//! holds a reference into the maps.
//!
//! Record lifecycle:
//! 1. Registrar mints a [`Client`] via [`ids::new_client_id`] and stores it
//! 2. Callback handler stores an [`AuthorizationCode`] bound to the user
//! 3. Token endpoint calls [`CredentialStore::redeem_auth_code`], which
//!    deletes the code atomically, then stores an [`AccessToken`]
//! 4. Validator reads the [`AccessToken`] on every protected request
//! 5. Background sweep calls [`CredentialStore::purge_expired`]
//!
//! Durability is pluggable through [`SnapshotBackend`]: every mutation
//! writes a full snapshot, and [`CredentialStore::open`] reloads it.

pub mod backend;
pub mod error;
pub mod ids;
pub mod records;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, Snapshot, SnapshotBackend};
pub use error::{Error, Result};
pub use records::{AccessToken, AuthorizationCode, Client, now_millis, now_secs};
pub use store::{CredentialStore, PurgeReport, Redemption, StoreCounts};
