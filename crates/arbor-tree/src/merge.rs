//! Merge planning: turn a diff into a set of conditional writes.
//!
//! The planner never touches storage. It decides, per diff entry, whether the
//! incoming version should be written and under which precondition; the
//! branch engine then commits the writes as a single patch and re-checks the
//! preconditions against its live tree.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use arbor_types::{FileMetadata, Tree};

use crate::diff::DiffEntry;

/// How divergent paths are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStrategy {
    /// Apply every incoming entry unconditionally.
    #[default]
    Override,
    /// Keep whichever version has the greater `mtime`.
    LastWriteWins,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => write!(f, "OVERRIDE"),
            Self::LastWriteWins => write!(f, "LAST_WRITE_WINS"),
        }
    }
}

/// Which side a conflict was resolved in favour of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
}

/// A path where the local and incoming versions disagreed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub path: String,
    pub local_mtime: Option<u64>,
    pub incoming_mtime: Option<u64>,
    /// Set when the conflict came from a failed `expectedCtime` check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_ctime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_ctime: Option<u64>,
    pub resolved: Resolution,
}

/// One planned write. `metadata: None` deletes the path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeWrite {
    pub path: String,
    pub metadata: Option<FileMetadata>,
    /// Commit only if the path's `ctime` still equals this value.
    pub expected_ctime: Option<u64>,
}

/// Output of [`plan_merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub writes: Vec<MergeWrite>,
    /// Conflicts decided at plan time. Always empty under `Override`.
    pub conflicts: Vec<Conflict>,
    /// Whether each diffed path existed locally when the plan was made.
    pub existed_locally: BTreeMap<String, bool>,
}

/// Decide between a local entry and an incoming write stamped `incoming_mtime`.
///
/// The incoming version wins iff there is no local entry or its `mtime` is
/// strictly greater than the local one.
pub fn resolve_last_write_wins(local: Option<&FileMetadata>, incoming_mtime: u64) -> Resolution {
    match local {
        Some(local) if incoming_mtime <= local.mtime => Resolution::Local,
        _ => Resolution::Remote,
    }
}

/// Build the writes that reconcile `current` with the diff `entries`.
///
/// Under [`MergeStrategy::Override`] every entry becomes an unconditional
/// write. Under [`MergeStrategy::LastWriteWins`] every write carries
/// `expected_ctime = local ctime` (or none if the path is absent locally),
/// and paths present on both sides are decided by `mtime`: the incoming
/// version is written iff its `mtime` is strictly greater, and either way a
/// [`Conflict`] is recorded. Incoming deletions carry no `mtime` and are
/// always written.
pub fn plan_merge(entries: &[DiffEntry], current: &Tree, strategy: MergeStrategy) -> MergePlan {
    let mut plan = MergePlan::default();

    for entry in entries {
        let local = current.get(&entry.path);
        plan.existed_locally.insert(entry.path.clone(), local.is_some());

        if strategy == MergeStrategy::Override {
            plan.writes.push(MergeWrite {
                path: entry.path.clone(),
                metadata: entry.metadata.clone(),
                expected_ctime: None,
            });
            continue;
        }

        if let (Some(local), Some(incoming)) = (local, entry.metadata.as_ref()) {
            let resolved = resolve_last_write_wins(Some(local), incoming.mtime);
            plan.conflicts.push(Conflict {
                path: entry.path.clone(),
                local_mtime: Some(local.mtime),
                incoming_mtime: Some(incoming.mtime),
                expected_ctime: None,
                actual_ctime: None,
                resolved,
            });
            if resolved == Resolution::Local {
                continue;
            }
        }

        plan.writes.push(MergeWrite {
            path: entry.path.clone(),
            metadata: entry.metadata.clone(),
            expected_ctime: local.map(|l| l.ctime),
        });
    }

    plan
}
