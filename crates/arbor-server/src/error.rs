use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use arbor_blob::BlobError;
use arbor_branch::BranchError;
use arbor_directory::CatalogError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Branch(e) => match e {
                BranchError::Conflict { .. } => StatusCode::CONFLICT,
                BranchError::NotInitialized(_) | BranchError::BranchNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BranchError::MissingProject(_)
                | BranchError::SelfBranch(_)
                | BranchError::NameMismatch { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Catalog(e) => match e {
                CatalogError::AlreadyExists { .. } => StatusCode::CONFLICT,
                CatalogError::InvalidBranchName { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Blob(BlobError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
