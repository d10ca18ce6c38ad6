//! Error types for catalog operations.

use thiserror::Error;

/// Errors that can occur while reading or updating the branch directory.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A record with this name already exists.
    #[error("branch already exists: {name}")]
    AlreadyExists { name: String },

    /// The branch name is invalid.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// The catalog file could not be decoded or encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error in the file-backed catalog.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
