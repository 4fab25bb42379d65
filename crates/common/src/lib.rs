//! Common types shared by the MCP OAuth proxy crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
