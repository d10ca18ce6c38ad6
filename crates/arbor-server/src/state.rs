use std::sync::Arc;

use tracing::info;

use arbor_blob::{BlobBackend, BlobStores};
use arbor_branch::{
    Branch, BranchNamespace, BranchStorage, EngineConfig, FileBranchStorage, InMemoryBranchStorage,
};
use arbor_directory::{validate_branch_name, BranchCatalog, InMemoryBranchCatalog, JsonFileBranchCatalog};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Patch logs and snapshots live under `<data_dir>/branches`.
pub const BRANCHES_DIR: &str = "branches";
/// Blob content lives under `<data_dir>/blobs`.
pub const BLOBS_DIR: &str = "blobs";
/// The branch directory file.
pub const DIRECTORY_FILE: &str = "directory.json";

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub namespace: BranchNamespace,
    pub catalog: Arc<dyn BranchCatalog>,
}

impl AppState {
    pub fn new(namespace: BranchNamespace, catalog: Arc<dyn BranchCatalog>) -> Self {
        Self { namespace, catalog }
    }

    pub fn in_memory(engine: EngineConfig) -> Self {
        Self::new(
            BranchNamespace::new(
                Arc::new(InMemoryBranchStorage::new()),
                Arc::new(BlobStores::in_memory()),
                engine,
            ),
            Arc::new(InMemoryBranchCatalog::new()),
        )
    }

    /// Build the backends `config` selects.
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let Some(dir) = &config.data_dir else {
            info!("using in-memory storage");
            return Ok(Self::in_memory(config.engine.clone()));
        };

        std::fs::create_dir_all(dir)?;
        let storage: Arc<dyn BranchStorage> = Arc::new(FileBranchStorage::new(dir.join(BRANCHES_DIR)));
        let blobs = Arc::new(BlobStores::new(BlobBackend::Filesystem {
            root: dir.join(BLOBS_DIR),
        }));
        let catalog = Arc::new(JsonFileBranchCatalog::open(dir.join(DIRECTORY_FILE))?);
        info!(data_dir = %dir.display(), "using filesystem storage");

        Ok(Self::new(
            BranchNamespace::new(storage, blobs, config.engine.clone()),
            catalog,
        ))
    }

    /// The engine for `name`, which must already be initialized.
    pub async fn branch(&self, name: &str) -> ServerResult<Arc<Branch>> {
        validate_branch_name(name)?;
        self.namespace
            .existing(name)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("branch {name}")))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
