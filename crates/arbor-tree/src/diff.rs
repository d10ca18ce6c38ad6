//! Tree-level diff: what one tree must apply to become another.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use arbor_types::{FileMetadata, Tree};

/// One path that differs between two trees.
///
/// `metadata` is the target entry for adds/modifications and `None` for
/// deletions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub metadata: Option<FileMetadata>,
}

impl DiffEntry {
    pub fn is_deletion(&self) -> bool {
        self.metadata.is_none()
    }
}

/// Compute what `from` must apply to become `to`.
///
/// For every path in the union of both trees:
/// - only in `to` → add (`to`'s entry)
/// - only in `from` → delete
/// - in both with a different address or user metadata → modify (`to`'s entry)
///
/// Identical entries produce nothing. Timestamps never cause a diff on their
/// own. Output is in path order.
pub fn diff_trees(from: &Tree, to: &Tree) -> Vec<DiffEntry> {
    let paths: BTreeSet<&String> = from.paths().chain(to.paths()).collect();

    paths
        .into_iter()
        .filter_map(|path| match (from.get(path), to.get(path)) {
            (None, Some(target)) => Some(DiffEntry {
                path: path.clone(),
                metadata: Some(target.clone()),
            }),
            (Some(_), None) => Some(DiffEntry {
                path: path.clone(),
                metadata: None,
            }),
            (Some(current), Some(target)) if !current.same_version(target) => Some(DiffEntry {
                path: path.clone(),
                metadata: Some(target.clone()),
            }),
            _ => None,
        })
        .collect()
}

/// Apply diff entries to `tree` unconditionally.
pub fn apply_diff(tree: &Tree, entries: &[DiffEntry]) -> Tree {
    let mut next = tree.clone();
    for entry in entries {
        match &entry.metadata {
            Some(file) => {
                next.insert(entry.path.clone(), file.clone());
            }
            None => {
                next.remove(&entry.path);
            }
        }
    }
    next
}
