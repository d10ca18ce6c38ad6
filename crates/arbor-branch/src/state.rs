use serde::{Deserialize, Serialize};

use arbor_types::Tree;

/// One branch's durable identity and materialized tree.
///
/// `tree` is a cache of folding patches `1..=seq`; the patch log stays the
/// source of truth and recovery replays any log entries past `seq`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchState {
    pub origin: Option<String>,
    pub tree: Tree,
    pub seq: u64,
    pub project_id: String,
    pub name: String,
    /// Timestamp of patch `seq`, or 0 before the first patch.
    #[serde(default)]
    pub timestamp: u64,
}

impl BranchState {
    /// Identity record of a branch that has no patches yet.
    pub fn empty(name: impl Into<String>, project_id: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            origin,
            tree: Tree::new(),
            seq: 0,
            project_id: project_id.into(),
            name: name.into(),
            timestamp: 0,
        }
    }
}

/// Parameters for creating a branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
    pub project_id: String,
    /// Defaults to the namespace's configured default branch.
    #[serde(default)]
    pub branch_name: Option<String>,
    /// Applied as patch 1, entries copied verbatim.
    #[serde(default)]
    pub initial_tree: Option<Tree>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl NewBranch {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.branch_name = Some(name.into());
        self
    }

    pub fn with_tree(mut self, tree: Tree) -> Self {
        self.initial_tree = Some(tree);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}
