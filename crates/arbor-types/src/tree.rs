use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::file::{FileMetadata, UserMetadata};

/// A point-in-time path → [`FileMetadata`] snapshot.
///
/// Backed by a `BTreeMap`, so iteration is always in path order and every
/// algorithm built on it is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    entries: BTreeMap<String, FileMetadata>,
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileMetadata> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, file: FileMetadata) -> Option<FileMetadata> {
        self.entries.insert(path.into(), file)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileMetadata> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileMetadata)> {
        self.entries.iter()
    }

    /// Paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Entries whose path starts with `prefix`.
    pub fn with_prefix(&self, prefix: &str) -> Tree {
        // Keys sharing a prefix are contiguous in a BTreeMap.
        let entries = self
            .entries
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, file)| (path.clone(), file.clone()))
            .collect();
        Tree { entries }
    }

    pub fn into_entries(self) -> BTreeMap<String, FileMetadata> {
        self.entries
    }
}

impl From<BTreeMap<String, FileMetadata>> for Tree {
    fn from(entries: BTreeMap<String, FileMetadata>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, FileMetadata)> for Tree {
    fn from_iter<I: IntoIterator<Item = (String, FileMetadata)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Tree {
    type Item = (String, FileMetadata);
    type IntoIter = std::collections::btree_map::IntoIter<String, FileMetadata>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// An immutable, ordered delta against a branch's tree.
///
/// Patch ids are branch-scoped, start at 1 and are gapless. The current tree
/// is the left fold of every patch in id order: `added` entries are upserted,
/// then `deleted` paths are removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreePatch {
    pub id: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub added: BTreeMap<String, FileMetadata>,
    #[serde(default)]
    pub deleted: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UserMetadata>,
}

impl TreePatch {
    /// Returns `true` if the patch neither adds nor deletes anything.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty()
    }

    /// The `metadata.type` tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("type"))
            .and_then(|v| v.as_str())
    }
}

/// How a single path changed between two trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}
