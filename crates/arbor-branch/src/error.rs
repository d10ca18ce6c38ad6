use thiserror::Error;

use arbor_blob::BlobError;

#[derive(Debug, Error)]
pub enum BranchError {
    #[error("branch not initialized: {0}")]
    NotInitialized(String),

    #[error("branch {0} has no project id")]
    MissingProject(String),

    #[error("cannot branch {0} onto itself")]
    SelfBranch(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch name mismatch: handle is {handle}, request names {requested}")]
    NameMismatch { handle: String, requested: String },

    #[error("precondition failed for {path}: expected ctime {expected}, found {actual:?}")]
    Conflict {
        path: String,
        expected: u64,
        actual: Option<u64>,
    },

    #[error("branch namespace has been dropped")]
    NamespaceClosed,

    #[error("corrupt branch storage: {0}")]
    Corrupt(String),

    #[error("blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BranchResult<T> = Result<T, BranchError>;
