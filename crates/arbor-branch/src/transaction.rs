//! Staging of multi-path writes into a single patch.
//!
//! Blob uploads happen before staging, so everything here is synchronous and
//! runs under the branch lock: preconditions are checked against the tree as
//! it was when the call began, accepted writes are stamped with the commit
//! timestamp, and the result is the `added`/`deleted` body of one patch.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use arbor_tree::{resolve_last_write_wins, Conflict, Resolution};
use arbor_types::{BlobAddress, FileMetadata, Tree, UserMetadata};

use crate::error::{BranchError, BranchResult};

/// One write or delete in a transactional batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePatch {
    pub path: String,
    /// New content; `None` deletes the path.
    pub content: Option<Bytes>,
    pub metadata: Option<UserMetadata>,
    /// Apply only if the path's current `ctime` equals this value.
    pub expected_ctime: Option<u64>,
    /// Explicit modification time. Used for last-write-wins resolution and
    /// stored on the entry; defaults to the commit timestamp.
    pub mtime: Option<u64>,
}

impl FilePatch {
    pub fn write(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            metadata: None,
            expected_ctime: None,
            mtime: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            metadata: None,
            expected_ctime: None,
            mtime: None,
        }
    }

    pub fn with_metadata(mut self, metadata: UserMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn expecting_ctime(mut self, ctime: u64) -> Self {
        self.expected_ctime = Some(ctime);
        self
    }

    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// Outcome for one path of a transactional write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// `false` only when a conflict was resolved in favour of the local entry.
    pub success: bool,
    /// The entry now at the path (`None` after a delete).
    pub metadata: Option<FileMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BlobAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

/// Result of [`Branch::transactional_write`](crate::Branch::transactional_write).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub results: BTreeMap<String, WriteResult>,
    /// Id of the committed patch; `None` when nothing changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<u64>,
}

/// A write whose content is already in the blob store.
#[derive(Clone, Debug)]
pub(crate) struct StagedWrite {
    pub path: String,
    /// `None` deletes the path.
    pub entry: Option<StagedEntry>,
    pub expected_ctime: Option<u64>,
}

#[derive(Clone, Debug)]
pub(crate) struct StagedEntry {
    pub address: BlobAddress,
    pub size_in_bytes: u64,
    pub metadata: UserMetadata,
    pub mtime: Option<u64>,
    pub ctime: Option<u64>,
}

impl StagedEntry {
    /// Materialize the entry at commit time `now` on top of `local`.
    ///
    /// Supplied times are kept, except that `ctime` never moves backwards and
    /// moves strictly forward when the version replaces a different local one.
    /// Otherwise `mtime` stays put when the content is unchanged.
    pub(crate) fn into_file(self, local: Option<&FileMetadata>, now: u64) -> FileMetadata {
        let mtime = match (self.mtime, local) {
            (Some(mtime), _) => mtime,
            (None, Some(local)) if local.address == self.address => local.mtime,
            (None, _) => now,
        };
        let ctime = match (self.ctime, local) {
            (Some(ctime), Some(local))
                if local.address == self.address && local.metadata == self.metadata =>
            {
                ctime.max(local.ctime)
            }
            (Some(ctime), Some(local)) => ctime.max(local.ctime + 1),
            (Some(ctime), None) => ctime,
            (None, _) => now,
        };
        FileMetadata {
            address: self.address,
            metadata: self.metadata,
            size_in_bytes: self.size_in_bytes,
            mtime,
            ctime,
        }
    }
}

impl From<FileMetadata> for StagedEntry {
    /// An entry copied from another tree, keeping its timestamps.
    fn from(file: FileMetadata) -> Self {
        Self {
            address: file.address,
            size_in_bytes: file.size_in_bytes,
            metadata: file.metadata,
            mtime: Some(file.mtime),
            ctime: Some(file.ctime),
        }
    }
}

/// The body of the patch a staged batch commits.
#[derive(Debug, Default)]
pub(crate) struct Staged {
    pub added: BTreeMap<String, FileMetadata>,
    pub deleted: Vec<String>,
    pub results: BTreeMap<String, WriteResult>,
    /// Preconditions that failed and were resolved by last-write-wins.
    pub conflicts: Vec<Conflict>,
}

impl Staged {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// Paths the patch actually changes.
    pub fn applied(&self) -> BTreeSet<&str> {
        self.added
            .keys()
            .chain(self.deleted.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Check preconditions and build the patch body for `writes` against `tree`.
///
/// Without `force`, any failed `expected_ctime` check fails the whole batch
/// with [`BranchError::Conflict`] and nothing is staged. With `force`, each
/// failed path is resolved independently by last-write-wins; a lost path is
/// reported with `success: false` and the local entry. Later writes to the
/// same path supersede earlier ones.
pub(crate) fn stage_writes(
    tree: &Tree,
    writes: Vec<StagedWrite>,
    force: bool,
    now: u64,
) -> BranchResult<Staged> {
    if !force {
        for write in &writes {
            if let Some(expected) = write.expected_ctime {
                let actual = tree.get(&write.path).map(|f| f.ctime);
                if actual != Some(expected) {
                    return Err(BranchError::Conflict {
                        path: write.path.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }
    }

    let mut changes: BTreeMap<String, Option<FileMetadata>> = BTreeMap::new();
    let mut staged = Staged::default();

    for write in writes {
        let local = match changes.get(&write.path) {
            Some(change) => change.clone(),
            None => tree.get(&write.path).cloned(),
        };

        let mut conflict = None;
        if let Some(expected) = write.expected_ctime {
            let actual = tree.get(&write.path).map(|f| f.ctime);
            if actual != Some(expected) {
                let incoming_mtime = write.entry.as_ref().and_then(|e| e.mtime).unwrap_or(now);
                let resolved = resolve_last_write_wins(local.as_ref(), incoming_mtime);
                let found = Conflict {
                    path: write.path.clone(),
                    local_mtime: local.as_ref().map(|l| l.mtime),
                    incoming_mtime: Some(incoming_mtime),
                    expected_ctime: Some(expected),
                    actual_ctime: actual,
                    resolved,
                };
                staged.conflicts.push(found.clone());

                if resolved == Resolution::Local {
                    staged.results.insert(
                        write.path,
                        WriteResult {
                            success: false,
                            address: local.as_ref().map(|l| l.address.clone()),
                            metadata: local,
                            conflict: Some(found),
                        },
                    );
                    continue;
                }
                conflict = Some(found);
            }
        }

        match write.entry {
            Some(entry) => {
                let file = entry.into_file(local.as_ref(), now);
                staged.results.insert(
                    write.path.clone(),
                    WriteResult {
                        success: true,
                        address: Some(file.address.clone()),
                        metadata: Some(file.clone()),
                        conflict,
                    },
                );
                changes.insert(write.path, Some(file));
            }
            None => {
                staged.results.insert(
                    write.path.clone(),
                    WriteResult {
                        success: true,
                        metadata: None,
                        address: None,
                        conflict,
                    },
                );
                if local.is_some() {
                    changes.insert(write.path, None);
                }
            }
        }
    }

    for (path, change) in changes {
        match change {
            Some(file) => {
                staged.added.insert(path, file);
            }
            None if tree.contains(&path) => staged.deleted.push(path),
            None => {}
        }
    }

    Ok(staged)
}
