//! Error types for snapshot persistence

/// Errors from loading or saving a store snapshot.
///
/// The store itself never surfaces these to callers: they are logged and
/// the in-memory state stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("snapshot parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
