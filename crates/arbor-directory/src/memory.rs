//! In-memory branch catalog for tests and ephemeral servers.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::names::validate_branch_name;
use crate::record::BranchRecord;
use crate::traits::BranchCatalog;

/// An in-memory implementation of [`BranchCatalog`].
///
/// Records live in a `BTreeMap` behind a `RwLock` and are lost when the
/// catalog is dropped.
#[derive(Debug, Default)]
pub struct InMemoryBranchCatalog {
    records: RwLock<BTreeMap<String, BranchRecord>>,
}

impl InMemoryBranchCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BranchCatalog for InMemoryBranchCatalog {
    fn create_branch(&self, record: BranchRecord) -> CatalogResult<BranchRecord> {
        let mut records = self.records.write().expect("lock poisoned");
        insert_record(&mut records, record)
    }

    fn get_branch(&self, name: &str) -> CatalogResult<Option<BranchRecord>> {
        Ok(self.records.read().expect("lock poisoned").get(name).cloned())
    }

    fn list_branches(&self, prefix: Option<&str>) -> CatalogResult<Vec<BranchRecord>> {
        Ok(list_records(&self.records.read().expect("lock poisoned"), prefix))
    }

    fn delete_branch(&self, name: &str) -> CatalogResult<bool> {
        let removed = self.records.write().expect("lock poisoned").remove(name).is_some();
        if removed {
            debug!(branch = name, "directory record deleted");
        }
        Ok(removed)
    }
}

/// Validate and insert `record`, refusing to overwrite an existing name.
pub(crate) fn insert_record(
    records: &mut BTreeMap<String, BranchRecord>,
    record: BranchRecord,
) -> CatalogResult<BranchRecord> {
    validate_branch_name(&record.name)?;
    if let Some(origin) = &record.origin_branch {
        validate_branch_name(origin)?;
    }
    if records.contains_key(&record.name) {
        return Err(CatalogError::AlreadyExists { name: record.name });
    }

    debug!(branch = %record.name, origin = ?record.origin_branch, "directory record created");
    records.insert(record.name.clone(), record.clone());
    Ok(record)
}

pub(crate) fn list_records(
    records: &BTreeMap<String, BranchRecord>,
    prefix: Option<&str>,
) -> Vec<BranchRecord> {
    let prefix = prefix.unwrap_or("");
    records
        .range(prefix.to_string()..)
        .take_while(|(name, _)| name.starts_with(prefix))
        .map(|(_, record)| record.clone())
        .collect()
}
