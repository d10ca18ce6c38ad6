use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use arbor_blob::BlobStores;

use crate::branch::Branch;
use crate::config::EngineConfig;
use crate::error::BranchResult;
use crate::state::NewBranch;
use crate::storage::{BranchStorage, InMemoryBranchStorage};

pub(crate) struct NamespaceShared {
    pub(crate) storage: Arc<dyn BranchStorage>,
    pub(crate) blobs: Arc<BlobStores>,
    pub(crate) config: EngineConfig,
    branches: RwLock<HashMap<String, Arc<Branch>>>,
}

impl NamespaceShared {
    /// The single engine instance for `name`, created on first use.
    pub(crate) fn branch(self: &Arc<Self>, name: &str) -> Arc<Branch> {
        if let Some(branch) = self.branches.read().expect("lock poisoned").get(name) {
            return Arc::clone(branch);
        }

        let mut branches = self.branches.write().expect("lock poisoned");
        let branch = branches.entry(name.to_string()).or_insert_with(|| {
            debug!(branch = name, "branch handle created");
            Arc::new(Branch::new(name, self))
        });
        Arc::clone(branch)
    }

    /// The engine for `name` if the branch is initialized. Unknown names
    /// leave no handle behind.
    pub(crate) async fn existing(
        self: &Arc<Self>,
        name: &str,
    ) -> BranchResult<Option<Arc<Branch>>> {
        let cached = self.branches.read().expect("lock poisoned").get(name).cloned();
        let branch = match cached {
            Some(branch) => branch,
            None if self.storage.load_state(name).await?.is_some() => self.branch(name),
            None => return Ok(None),
        };
        Ok(branch.is_initialized().await?.then_some(branch))
    }
}

/// Resolves branch names to their engine instances.
///
/// Each name maps to exactly one [`Branch`], so every mutation of a branch is
/// serialized through the same lock no matter which caller issued it.
/// Branches load their state lazily on first use.
#[derive(Clone)]
pub struct BranchNamespace {
    shared: Arc<NamespaceShared>,
}

impl BranchNamespace {
    pub fn new(storage: Arc<dyn BranchStorage>, blobs: Arc<BlobStores>, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(NamespaceShared {
                storage,
                blobs,
                config,
                branches: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Namespace with in-memory branch storage and blob stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryBranchStorage::new()),
            Arc::new(BlobStores::in_memory()),
            EngineConfig::default(),
        )
    }

    /// Handle for `name`. The branch may not be initialized yet.
    pub fn get(&self, name: &str) -> Arc<Branch> {
        self.shared.branch(name)
    }

    /// Create (or reopen) a branch. Initialization is idempotent.
    pub async fn open(&self, request: NewBranch) -> BranchResult<Arc<Branch>> {
        let name = request
            .branch_name
            .clone()
            .unwrap_or_else(|| self.shared.config.default_branch.clone());
        let branch = self.get(&name);
        branch.initialize(request).await?;
        Ok(branch)
    }

    /// Handle for `name` only if the branch has been initialized.
    pub async fn existing(&self, name: &str) -> BranchResult<Option<Arc<Branch>>> {
        self.shared.existing(name).await
    }

    /// Whether `name` has been initialized.
    pub async fn exists(&self, name: &str) -> BranchResult<bool> {
        Ok(self.existing(name).await?.is_some())
    }

    pub fn blobs(&self) -> &Arc<BlobStores> {
        &self.shared.blobs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Number of branch handles created so far.
    pub fn handle_count(&self) -> usize {
        self.shared.branches.read().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for BranchNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchNamespace")
            .field("config", &self.shared.config)
            .field("handles", &self.handle_count())
            .finish()
    }
}
