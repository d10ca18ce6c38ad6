use std::io::Cursor;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::task::JoinSet;

use arbor_types::{BlobAddress, BlobHash, BlobInfo};

use crate::error::{BlobError, BlobResult};

/// Streaming reader over a blob's content.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content-addressed blob store scoped to one project.
///
/// All implementations must satisfy these invariants:
/// - A blob's key is always the digest of its bytes.
/// - Storing identical bytes twice is a no-op that returns the same hash.
/// - Lookups of unknown hashes return `Ok(None)` rather than an error.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Identifier used as the `<store-id>` segment of addresses.
    fn store_id(&self) -> &str;

    /// Store bytes whose digest has already been computed.
    ///
    /// Must be an idempotent upsert: if `info.hash` is present, do nothing.
    async fn insert(&self, info: BlobInfo, data: Bytes) -> BlobResult<()>;

    /// Read a blob's content. Returns `Ok(None)` if the hash is unknown.
    async fn get(&self, hash: &BlobHash) -> BlobResult<Option<Bytes>>;

    /// Size and hash of a stored blob, without reading its content.
    async fn get_info(&self, hash: &BlobHash) -> BlobResult<Option<BlobInfo>>;

    /// Check whether a blob exists.
    async fn has(&self, hash: &BlobHash) -> BlobResult<bool> {
        Ok(self.get_info(hash).await?.is_some())
    }

    /// Stream a blob's content.
    ///
    /// The default buffers the blob in memory; backends with their own
    /// readers override it.
    async fn get_stream(&self, hash: &BlobHash) -> BlobResult<Option<BlobReader>> {
        Ok(self
            .get(hash)
            .await?
            .map(|data| Box::pin(Cursor::new(data)) as BlobReader))
    }

    /// Hash and store `data`.
    async fn put(&self, data: Bytes) -> BlobResult<BlobInfo> {
        let info = BlobInfo::describe(&data);
        self.insert(info, data).await?;
        Ok(info)
    }

    /// Hash every item in parallel, then store them in input order.
    ///
    /// The result has one entry per input item, in the same order; duplicate
    /// items yield duplicate (identical) infos.
    async fn put_batch(&self, items: Vec<Bytes>) -> BlobResult<Vec<BlobInfo>> {
        let infos = digest_all(&items).await?;
        for (info, data) in infos.iter().zip(items) {
            self.insert(*info, data).await?;
        }
        Ok(infos)
    }

    /// Address of `hash` within this store.
    fn address(&self, hash: &BlobHash) -> BlobAddress {
        BlobAddress::new(self.store_id(), *hash)
    }
}

/// Compute [`BlobInfo`] for every item on the blocking pool, preserving order.
pub(crate) async fn digest_all(items: &[Bytes]) -> BlobResult<Vec<BlobInfo>> {
    let mut tasks = JoinSet::new();
    for (index, item) in items.iter().enumerate() {
        let item = item.clone();
        tasks.spawn_blocking(move || (index, BlobInfo::describe(&item)));
    }

    let mut infos: Vec<Option<BlobInfo>> = vec![None; items.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, info) = joined.map_err(|e| BlobError::Task(e.to_string()))?;
        infos[index] = Some(info);
    }

    infos
        .into_iter()
        .map(|info| info.ok_or_else(|| BlobError::Task("missing digest".into())))
        .collect()
}
