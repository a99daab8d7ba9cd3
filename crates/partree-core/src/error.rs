//! Typed errors for store operations
//!
//! Expected outcomes (duplicate paths, missing parents, delete guards,
//! stale-digest conflicts) are explicit variants so callers can match on
//! them instead of parsing messages. `Conflict` is the only kind worth
//! retrying; everything else indicates a usage fault that will not go away
//! without changing the input.

use std::io;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed path input. Always a caller bug, never retried.
    #[error("Invalid path '{0}': expected dot-separated segments of [A-Za-z0-9_-]")]
    InvalidPath(String),

    /// Create on a path that already holds a node
    #[error("A node already exists at '{0}'")]
    DuplicatePath(String),

    /// Update, delete, or another node-dependent operation on a missing path
    #[error("No node exists at '{0}'")]
    NotFound(String),

    /// Create under a nonexistent parent (strict ancestor policy)
    #[error("Cannot create '{path}': parent '{parent}' does not exist")]
    MissingParent { path: String, parent: String },

    /// Delete on a node that still has children
    #[error("Cannot delete '{0}': node has children")]
    HasChildren(String),

    /// Another writer committed the document since it was loaded.
    /// Reload, reapply the edit, and save again.
    #[error("Document changed since it was loaded: expected digest {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    /// The stored document fails its own digest check
    #[error("Stored document is corrupted: {0}")]
    Corrupt(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Document or cache entry (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True when retrying the whole read-modify-write sequence can succeed.
    ///
    /// Only `Conflict` qualifies: the document was changed by another writer
    /// and the caller should reload and reapply its edit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
