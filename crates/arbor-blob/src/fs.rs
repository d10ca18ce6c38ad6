use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use arbor_types::{BlobHash, BlobInfo};

use crate::error::{BlobError, BlobResult};
use crate::traits::{BlobReader, BlobStore};

/// Filesystem blob store.
///
/// Each blob is one file at `<root>/<first two hex chars>/<remaining hex>`.
/// New blobs are written to a temp file in the target directory and then
/// persisted into place, so a reader never observes a partially written
/// blob. Content is re-hashed on `get` to detect corruption.
pub struct FsBlobStore {
    store_id: String,
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (or lazily create) a store rooted at `root`.
    pub fn new(store_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            store_id: store_id.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &BlobHash) -> PathBuf {
        let hex = hash.to_hex();
        let (shard, rest) = hex.split_at(2);
        self.root.join(shard).join(rest)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn store_id(&self) -> &str {
        &self.store_id
    }

    async fn insert(&self, info: BlobInfo, data: Bytes) -> BlobResult<()> {
        let path = self.blob_path(&info.hash);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || write_atomically(&path, &data))
            .await
            .map_err(|e| BlobError::Task(e.to_string()))??;

        debug!(hash = %info.hash.short_hex(), size = info.size_in_bytes, "blob stored");
        Ok(())
    }

    async fn get(&self, hash: &BlobHash) -> BlobResult<Option<Bytes>> {
        let data = match tokio::fs::read(self.blob_path(hash)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let computed = BlobHash::of(&data);
        if computed != *hash {
            return Err(BlobError::HashMismatch {
                expected: *hash,
                computed,
            });
        }
        Ok(Some(Bytes::from(data)))
    }

    async fn get_info(&self, hash: &BlobHash) -> BlobResult<Option<BlobInfo>> {
        match tokio::fs::metadata(self.blob_path(hash)).await {
            Ok(meta) => Ok(Some(BlobInfo {
                hash: *hash,
                size_in_bytes: meta.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_stream(&self, hash: &BlobHash) -> BlobResult<Option<BlobReader>> {
        match tokio::fs::File::open(self.blob_path(hash)).await {
            Ok(file) => Ok(Some(Box::pin(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "blob path has no parent"))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    // A concurrent writer may have persisted identical content first; the
    // rename simply replaces it.
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl std::fmt::Debug for FsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBlobStore")
            .field("store_id", &self.store_id)
            .field("root", &self.root)
            .finish()
    }
}
