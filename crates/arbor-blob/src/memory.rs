use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use arbor_types::{BlobHash, BlobInfo};

use crate::error::BlobResult;
use crate::traits::BlobStore;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. Blobs live behind a `RwLock`; `Bytes`
/// makes reads cheap reference-counted clones.
pub struct InMemoryBlobStore {
    store_id: String,
    blobs: RwLock<HashMap<BlobHash, Bytes>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store with the given id.
    pub fn new(store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    async fn insert(&self, info: BlobInfo, data: Bytes) -> BlobResult<()> {
        let mut blobs = self.blobs.write().expect("lock poisoned");
        blobs.entry(info.hash).or_insert(data);
        Ok(())
    }

    async fn get(&self, hash: &BlobHash) -> BlobResult<Option<Bytes>> {
        Ok(self.blobs.read().expect("lock poisoned").get(hash).cloned())
    }

    async fn get_info(&self, hash: &BlobHash) -> BlobResult<Option<BlobInfo>> {
        Ok(self
            .blobs
            .read()
            .expect("lock poisoned")
            .get(hash)
            .map(|data| BlobInfo {
                hash: *hash,
                size_in_bytes: data.len() as u64,
            }))
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("store_id", &self.store_id)
            .field("blob_count", &self.len())
            .finish()
    }
}
