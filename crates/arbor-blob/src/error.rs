use arbor_types::{BlobHash, TypeError};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Stored bytes no longer hash to their key (on-disk corruption).
    #[error("hash mismatch for {expected}: content hashes to {computed}")]
    HashMismatch {
        expected: BlobHash,
        computed: BlobHash,
    },

    /// The address could not be parsed.
    #[error("invalid blob address: {0}")]
    InvalidAddress(#[from] TypeError),

    /// A background hashing or I/O task failed to complete.
    #[error("blob task failed: {0}")]
    Task(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;
