//! Snapshot persistence strategies
//!
//! The store serializes its full state on every mutation and hands it to a
//! [`SnapshotBackend`]. [`FileBackend`] writes a JSON file atomically
//! (temp file + rename, mode 0600); [`MemoryBackend`] keeps nothing.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::records::{AccessToken, AuthorizationCode, Client};

/// Full persisted state: three maps keyed by their identifiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub clients: HashMap<String, Client>,
    #[serde(default)]
    pub auth_codes: HashMap<String, AuthorizationCode>,
    #[serde(default)]
    pub access_tokens: HashMap<String, AccessToken>,
    /// When the snapshot was written (unix milliseconds)
    #[serde(default)]
    pub saved_at: u64,
}

/// Where store snapshots go.
///
/// Uses `Pin<Box<dyn Future>>` return types so the store can hold an
/// `Arc<dyn SnapshotBackend>`.
pub trait SnapshotBackend: Send + Sync {
    /// Human-readable location for logs
    fn describe(&self) -> String;

    /// Load the last snapshot, or `None` on a cold start.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>>> + Send + '_>>;

    /// Replace the persisted snapshot.
    fn save<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Keeps nothing; state lives only as long as the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl SnapshotBackend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".into()
    }

    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }

    fn save<'a>(
        &'a self,
        _snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}

/// JSON snapshot file on local disk.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotBackend for FileBackend {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Option<Snapshot>>> + Send + '_>> {
        Box::pin(async move {
            if !self.path.exists() {
                return Ok(None);
            }
            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| Error::Io(format!("reading snapshot: {e}")))?;
            let snapshot: Snapshot = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing snapshot: {e}")))?;
            Ok(Some(snapshot))
        })
    }

    fn save<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(write_atomic(&self.path, snapshot))
    }
}

/// Write the snapshot to `path` atomically.
///
/// Writes a temp file next to the target and renames it over the target, so
/// a crash mid-write leaves the previous snapshot intact. The file holds
/// client secrets and bearer tokens, so it is created 0600 on unix.
async fn write_atomic(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::Parse(format!("serializing snapshot: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("snapshot path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("oauth-storage.json");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp snapshot: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting snapshot permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp snapshot: {e}")))?;

    debug!(path = %path.display(), "persisted snapshot");
    Ok(())
}
