//! Error types for shortcut_smt

use crate::model::Hash;
use thiserror::Error;

/// Result type alias for shortcut_smt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tree and store operations
///
/// Precondition failures (key out of range, wrong proof length) and proof
/// mismatches are not errors: the engine reports them as `Ok(false)` or
/// `Ok(None)` and leaves the store untouched.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid tree height {0}: must be between 2 and 257")]
    InvalidHeight(usize),

    #[error("Stale read: expected root {expected}, tree root is {actual}")]
    StaleRoot { expected: Hash, actual: Hash },

    #[error("Tree invariant violated: {0}")]
    Invariant(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),
}
