use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::CatalogResult;
use crate::memory::{insert_record, list_records};
use crate::record::BranchRecord;
use crate::traits::BranchCatalog;

/// A [`BranchCatalog`] persisted as a single JSON array.
///
/// Every mutation rewrites the whole file through a temporary file in the
/// same directory that is persisted over the old one, so readers see either
/// the previous catalog or the new one. The in-memory copy only changes once
/// the write succeeded.
pub struct JsonFileBranchCatalog {
    path: PathBuf,
    records: Mutex<BTreeMap<String, BranchRecord>>,
}

impl JsonFileBranchCatalog {
    /// Open the catalog at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(data) => {
                let list: Vec<BranchRecord> = serde_json::from_slice(&data)?;
                list.into_iter().map(|r| (r.name.clone(), r)).collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), records = records.len(), "branch directory opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, records: &BTreeMap<String, BranchRecord>) -> CatalogResult<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let list: Vec<&BranchRecord> = records.values().collect();
        let data = serde_json::to_vec_pretty(&list)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), records = list.len(), "branch directory written");
        Ok(())
    }
}

impl BranchCatalog for JsonFileBranchCatalog {
    fn create_branch(&self, record: BranchRecord) -> CatalogResult<BranchRecord> {
        let mut records = self.records.lock().expect("lock poisoned");
        let mut next = records.clone();
        let created = insert_record(&mut next, record)?;
        self.write(&next)?;
        *records = next;
        Ok(created)
    }

    fn get_branch(&self, name: &str) -> CatalogResult<Option<BranchRecord>> {
        Ok(self.records.lock().expect("lock poisoned").get(name).cloned())
    }

    fn list_branches(&self, prefix: Option<&str>) -> CatalogResult<Vec<BranchRecord>> {
        Ok(list_records(&self.records.lock().expect("lock poisoned"), prefix))
    }

    fn delete_branch(&self, name: &str) -> CatalogResult<bool> {
        let mut records = self.records.lock().expect("lock poisoned");
        if !records.contains_key(name) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(name);
        self.write(&next)?;
        *records = next;
        Ok(true)
    }
}

impl std::fmt::Debug for JsonFileBranchCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileBranchCatalog")
            .field("path", &self.path)
            .field("records", &self.records.lock().expect("lock poisoned").len())
            .finish()
    }
}
