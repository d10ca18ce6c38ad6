//! Per-project blob store provisioning.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::debug;

use arbor_types::{BlobAddress, BlobHash};

use crate::fs::FsBlobStore;
use crate::memory::InMemoryBlobStore;
use crate::traits::BlobStore;

/// Which backend newly provisioned stores use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobBackend {
    Memory,
    /// One [`FsBlobStore`] per project under `root/<hex(project id)>`.
    Filesystem { root: PathBuf },
}

/// Lazily provisioned, shared blob stores keyed by project id.
///
/// All branches of a project share the same store instance, so identical
/// content written on any branch is stored once.
pub struct BlobStores {
    backend: BlobBackend,
    stores: RwLock<HashMap<String, Arc<dyn BlobStore>>>,
}

impl BlobStores {
    pub fn new(backend: BlobBackend) -> Self {
        Self {
            backend,
            stores: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(BlobBackend::Memory)
    }

    pub fn backend(&self) -> &BlobBackend {
        &self.backend
    }

    /// The store for `project_id`, creating it on first use.
    pub fn for_project(&self, project_id: &str) -> Arc<dyn BlobStore> {
        if let Some(store) = self.stores.read().expect("lock poisoned").get(project_id) {
            return Arc::clone(store);
        }

        let mut stores = self.stores.write().expect("lock poisoned");
        let store = stores
            .entry(project_id.to_string())
            .or_insert_with(|| {
                debug!(project_id, "provisioning blob store");
                self.provision(project_id)
            });
        Arc::clone(store)
    }

    /// The store for `project_id` only if it already holds content.
    ///
    /// Read paths use this so lookups of unknown projects provision nothing.
    pub fn existing(&self, project_id: &str) -> Option<Arc<dyn BlobStore>> {
        if let Some(store) = self.stores.read().expect("lock poisoned").get(project_id) {
            return Some(Arc::clone(store));
        }
        match &self.backend {
            BlobBackend::Memory => None,
            BlobBackend::Filesystem { root } if root.join(hex::encode(project_id)).is_dir() => {
                Some(self.for_project(project_id))
            }
            BlobBackend::Filesystem { .. } => None,
        }
    }

    /// Resolve an address to its store and hash.
    pub fn resolve(&self, address: &BlobAddress) -> (Arc<dyn BlobStore>, BlobHash) {
        (self.for_project(address.store_id()), *address.hash())
    }

    /// Number of stores provisioned so far.
    pub fn len(&self) -> usize {
        self.stores.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn provision(&self, project_id: &str) -> Arc<dyn BlobStore> {
        match &self.backend {
            BlobBackend::Memory => Arc::new(InMemoryBlobStore::new(project_id)),
            BlobBackend::Filesystem { root } => Arc::new(FsBlobStore::new(
                project_id,
                root.join(hex::encode(project_id)),
            )),
        }
    }
}

impl Default for BlobStores {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for BlobStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStores")
            .field("backend", &self.backend)
            .field("store_count", &self.len())
            .finish()
    }
}
