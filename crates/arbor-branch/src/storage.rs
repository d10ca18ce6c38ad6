use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use arbor_types::TreePatch;

use crate::error::{BranchError, BranchResult};
use crate::state::BranchState;

/// Durable home of every branch's patch log and state snapshot.
///
/// Implementations key everything by branch name. They are not expected to
/// serialize writers: the branch engine issues at most one mutation per
/// branch at a time.
#[async_trait]
pub trait BranchStorage: Send + Sync {
    /// The last saved snapshot, or `None` if the branch was never created.
    async fn load_state(&self, branch: &str) -> BranchResult<Option<BranchState>>;

    /// Replace the snapshot for `state.name`.
    async fn save_state(&self, state: &BranchState) -> BranchResult<()>;

    /// Append one patch to the branch's log.
    async fn append_patch(&self, branch: &str, patch: &TreePatch) -> BranchResult<()>;

    /// Every logged patch with `id > after_seq`, in id order.
    async fn read_patches(&self, branch: &str, after_seq: u64) -> BranchResult<Vec<TreePatch>>;
}

#[derive(Default)]
struct StoredBranch {
    state: Option<BranchState>,
    patches: Vec<TreePatch>,
}

/// In-memory branch storage for tests, local demos, and embedding.
#[derive(Default)]
pub struct InMemoryBranchStorage {
    branches: RwLock<HashMap<String, StoredBranch>>,
}

impl InMemoryBranchStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of branches with a saved state.
    pub fn branch_count(&self) -> usize {
        self.branches
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|b| b.state.is_some())
            .count()
    }
}

#[async_trait]
impl BranchStorage for InMemoryBranchStorage {
    async fn load_state(&self, branch: &str) -> BranchResult<Option<BranchState>> {
        let branches = self.branches.read().expect("lock poisoned");
        Ok(branches.get(branch).and_then(|b| b.state.clone()))
    }

    async fn save_state(&self, state: &BranchState) -> BranchResult<()> {
        let mut branches = self.branches.write().expect("lock poisoned");
        branches.entry(state.name.clone()).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn append_patch(&self, branch: &str, patch: &TreePatch) -> BranchResult<()> {
        let mut branches = self.branches.write().expect("lock poisoned");
        let stored = branches.entry(branch.to_string()).or_default();
        let expected = stored.patches.last().map_or(1, |p| p.id + 1);
        if patch.id != expected {
            return Err(BranchError::Corrupt(format!(
                "append out of order on {branch}: expected patch {expected}, got {}",
                patch.id
            )));
        }
        stored.patches.push(patch.clone());
        Ok(())
    }

    async fn read_patches(&self, branch: &str, after_seq: u64) -> BranchResult<Vec<TreePatch>> {
        let branches = self.branches.read().expect("lock poisoned");
        Ok(branches
            .get(branch)
            .map(|b| {
                b.patches
                    .iter()
                    .filter(|p| p.id > after_seq)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for InMemoryBranchStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBranchStorage")
            .field("branch_count", &self.branch_count())
            .finish()
    }
}
