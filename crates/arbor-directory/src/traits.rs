//! The [`BranchCatalog`] trait defining the directory storage interface.

use crate::error::CatalogResult;
use crate::record::BranchRecord;

/// Storage backend for branch directory records.
///
/// Implementations must be thread-safe and apply each operation atomically.
/// Records are keyed by [`BranchRecord::name`].
pub trait BranchCatalog: Send + Sync {
    /// Insert a new record. Fails with
    /// [`CatalogError::AlreadyExists`](crate::CatalogError::AlreadyExists)
    /// if the name is taken, and rejects invalid names.
    fn create_branch(&self, record: BranchRecord) -> CatalogResult<BranchRecord>;

    /// Read a record by name. Returns `Ok(None)` if absent.
    fn get_branch(&self, name: &str) -> CatalogResult<Option<BranchRecord>>;

    /// Every record whose name starts with `prefix`, sorted by name.
    /// `None` lists everything.
    fn list_branches(&self, prefix: Option<&str>) -> CatalogResult<Vec<BranchRecord>>;

    /// Remove a record. Returns whether it existed.
    fn delete_branch(&self, name: &str) -> CatalogResult<bool>;

    /// Whether a record with this name exists.
    fn contains(&self, name: &str) -> CatalogResult<bool> {
        Ok(self.get_branch(name)?.is_some())
    }
}
