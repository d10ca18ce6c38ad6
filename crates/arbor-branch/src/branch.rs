use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use arbor_blob::{BlobError, BlobStore, BlobStores};
use arbor_tree::{apply_patch, diff_trees, plan_merge, Conflict, DiffEntry, MergeStrategy};
use arbor_types::{FileMetadata, PatchClock, Tree, TreePatch, UserMetadata};
use arbor_watch::{replay_events, ChangeEvent, ChangeNotifier, Subscription, WatchOptions};

use crate::error::{BranchError, BranchResult};
use crate::namespace::NamespaceShared;
use crate::state::{BranchState, NewBranch};
use crate::storage::BranchStorage;
use crate::transaction::{stage_writes, FilePatch, StagedEntry, StagedWrite, TransactionResult};

/// Result of [`Branch::merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    pub files_merged: usize,
    /// Every path where both sides disagreed, with the side that won.
    /// Always empty under `OVERRIDE`.
    pub conflicts: Vec<Conflict>,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    /// Id of the committed patch; `None` when nothing changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<u64>,
}

enum Slot {
    /// Not read from storage yet, or a commit failed part-way.
    Unloaded,
    Uninitialized,
    Active(BranchState),
}

/// The engine for one branch.
///
/// All operations that touch the tree take the branch lock, so patches are
/// assigned ids, stamped, persisted and published in a strict total order.
/// Blob uploads happen before the lock is taken. Different branches never
/// share a lock.
///
/// Every commit runs: build the patch and the next tree in memory, append
/// the patch to the log, save the state snapshot, swap the in-memory state,
/// then notify watchers. If either storage step fails the in-memory state is
/// discarded and reloaded (snapshot plus log tail) on next use.
pub struct Branch {
    name: String,
    storage: Arc<dyn BranchStorage>,
    blobs: Arc<BlobStores>,
    namespace: Weak<NamespaceShared>,
    slot: Mutex<Slot>,
    clock: PatchClock,
    notifier: ChangeNotifier,
}

fn tagged(kind: &str) -> UserMetadata {
    let mut metadata = UserMetadata::new();
    metadata.insert("type".into(), Value::String(kind.into()));
    metadata
}

impl Branch {
    pub(crate) fn new(name: &str, shared: &Arc<NamespaceShared>) -> Self {
        Self {
            name: name.to_string(),
            storage: Arc::clone(&shared.storage),
            blobs: Arc::clone(&shared.blobs),
            namespace: Arc::downgrade(shared),
            slot: Mutex::new(Slot::Unloaded),
            clock: PatchClock::new(),
            notifier: ChangeNotifier::new(shared.config.watch_channel_capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- Lifecycle ----

    /// Set the branch's identity and apply `initial_tree` as patch 1.
    ///
    /// Idempotent: an already initialized branch is left untouched.
    pub async fn initialize(&self, request: NewBranch) -> BranchResult<()> {
        if let Some(requested) = &request.branch_name {
            if requested != &self.name {
                return Err(BranchError::NameMismatch {
                    handle: self.name.clone(),
                    requested: requested.clone(),
                });
            }
        }

        let mut slot = self.lock().await?;
        if matches!(*slot, Slot::Active(_)) {
            debug!(branch = %self.name, "branch already initialized");
            return Ok(());
        }
        if request.project_id.is_empty() {
            return Err(BranchError::MissingProject(self.name.clone()));
        }

        // Identity is durable before any patch exists.
        let state = BranchState::empty(&self.name, request.project_id, request.origin);
        self.storage.save_state(&state).await?;
        info!(
            branch = %self.name,
            project = %state.project_id,
            origin = ?state.origin,
            "branch initialized"
        );
        *slot = Slot::Active(state);

        if let Some(tree) = request.initial_tree.filter(|tree| !tree.is_empty()) {
            let now = self.clock.tick();
            self.commit(&mut slot, now, tree.into_entries(), Vec::new(), tagged("init"))
                .await?;
        }
        Ok(())
    }

    pub async fn is_initialized(&self) -> BranchResult<bool> {
        Ok(matches!(*self.lock().await?, Slot::Active(_)))
    }

    /// Snapshot of the durable state, or `None` before initialization.
    pub async fn state(&self) -> BranchResult<Option<BranchState>> {
        Ok(match &*self.lock().await? {
            Slot::Active(state) => Some(state.clone()),
            _ => None,
        })
    }

    // ---- Reads ----

    pub async fn get_file_metadata(&self, path: &str) -> BranchResult<Option<FileMetadata>> {
        Ok(match &*self.lock().await? {
            Slot::Active(state) => state.tree.get(path).cloned(),
            _ => None,
        })
    }

    pub async fn has_file(&self, path: &str) -> BranchResult<bool> {
        Ok(self.get_file_metadata(path).await?.is_some())
    }

    /// Entries whose path starts with `prefix`, or the whole tree.
    pub async fn list_files(&self, prefix: Option<&str>) -> BranchResult<Tree> {
        Ok(match (&*self.lock().await?, prefix) {
            (Slot::Active(state), Some(prefix)) => state.tree.with_prefix(prefix),
            (Slot::Active(state), None) => state.tree.clone(),
            _ => Tree::new(),
        })
    }

    /// Content of the file at `path`.
    ///
    /// `None` if the path is absent or its blob cannot be found.
    pub async fn get_file(&self, path: &str) -> BranchResult<Option<Bytes>> {
        let Some(file) = self.get_file_metadata(path).await? else {
            return Ok(None);
        };
        let (store, hash) = self.blobs.resolve(&file.address);
        let content = store.get(&hash).await?;
        if content.is_none() {
            warn!(branch = %self.name, path, address = %file.address, "dangling blob address");
        }
        Ok(content)
    }

    /// Id of the last committed patch; 0 before the first.
    pub async fn seq(&self) -> BranchResult<u64> {
        Ok(match &*self.lock().await? {
            Slot::Active(state) => state.seq,
            _ => 0,
        })
    }

    pub async fn tree(&self) -> BranchResult<Tree> {
        self.list_files(None).await
    }

    /// The full patch log, in id order.
    pub async fn patches(&self) -> BranchResult<Vec<TreePatch>> {
        self.storage.read_patches(&self.name, 0).await
    }

    // ---- Writes ----

    /// Store `content` and point `path` at it in a single-entry patch.
    pub async fn write_file(
        &self,
        path: &str,
        content: Bytes,
        metadata: Option<UserMetadata>,
    ) -> BranchResult<FileMetadata> {
        let store = self.blob_store().await?;
        let info = store.put(content).await?;
        let entry = StagedEntry {
            address: store.address(&info.hash),
            size_in_bytes: info.size_in_bytes,
            metadata: metadata.unwrap_or_default(),
            mtime: None,
            ctime: None,
        };

        let mut slot = self.lock().await?;
        let now = self.clock.tick();
        let file = entry.into_file(self.active(&slot)?.tree.get(path), now);

        let mut added = BTreeMap::new();
        added.insert(path.to_string(), file.clone());
        self.commit(&mut slot, now, added, Vec::new(), tagged("write"))
            .await?;
        Ok(file)
    }

    /// Delete `path`. Returns `false`, without writing a patch, if it is absent.
    pub async fn delete_file(&self, path: &str) -> BranchResult<bool> {
        let mut slot = self.lock().await?;
        match &*slot {
            Slot::Active(state) if state.tree.contains(path) => {}
            _ => return Ok(false),
        }

        let now = self.clock.tick();
        self.commit(
            &mut slot,
            now,
            BTreeMap::new(),
            vec![path.to_string()],
            tagged("delete"),
        )
        .await?;
        Ok(true)
    }

    /// Apply a batch of writes and deletes as one patch.
    ///
    /// All contents are uploaded first. Then, under the branch lock, every
    /// `expected_ctime` is checked against the current tree. Without `force`
    /// any mismatch fails the call with [`BranchError::Conflict`] and no patch
    /// is written (uploaded blobs stay in the store, unreferenced). With
    /// `force` each mismatching path is resolved by last-write-wins. A batch
    /// that changes nothing commits no patch.
    pub async fn transactional_write(
        &self,
        patches: Vec<FilePatch>,
        force: bool,
    ) -> BranchResult<TransactionResult> {
        let store = self.blob_store().await?;
        let contents: Vec<Bytes> = patches.iter().filter_map(|p| p.content.clone()).collect();
        let mut infos = store.put_batch(contents).await?.into_iter();

        let mut writes = Vec::with_capacity(patches.len());
        for patch in patches {
            let entry = match patch.content {
                Some(_) => {
                    let info = infos
                        .next()
                        .ok_or_else(|| BlobError::Task("blob batch returned too few results".into()))?;
                    Some(StagedEntry {
                        address: store.address(&info.hash),
                        size_in_bytes: info.size_in_bytes,
                        metadata: patch.metadata.unwrap_or_default(),
                        mtime: patch.mtime,
                        ctime: None,
                    })
                }
                None => None,
            };
            writes.push(StagedWrite {
                path: patch.path,
                entry,
                expected_ctime: patch.expected_ctime,
            });
        }

        let mut slot = self.lock().await?;
        let now = self.clock.tick();
        let staged = match stage_writes(&self.active(&slot)?.tree, writes, force, now) {
            Ok(staged) => staged,
            Err(e) => {
                debug!(branch = %self.name, error = %e, "transaction rejected");
                return Err(e);
            }
        };

        let changed = !staged.is_empty();
        let mut result = TransactionResult {
            results: staged.results,
            patch_id: None,
        };
        if changed {
            let mut metadata = tagged("transaction");
            metadata.insert("force".into(), json!(force));
            metadata.insert("conflicts".into(), json!(staged.conflicts.len()));
            let patch = self
                .commit(&mut slot, now, staged.added, staged.deleted, metadata)
                .await?;
            result.patch_id = Some(patch.id);
        }
        Ok(result)
    }

    /// Empty the tree in one patch, keeping identity, origin and history.
    ///
    /// Returns the number of files removed; 0 (and no patch) if already empty.
    pub async fn soft_delete(&self) -> BranchResult<usize> {
        let mut slot = self.lock().await?;
        let deleted: Vec<String> = self.active(&slot)?.tree.paths().cloned().collect();
        if deleted.is_empty() {
            return Ok(0);
        }

        let count = deleted.len();
        let now = self.clock.tick();
        self.commit(&mut slot, now, BTreeMap::new(), deleted, tagged("softDelete"))
            .await?;
        info!(branch = %self.name, removed = count, "branch soft-deleted");
        Ok(count)
    }

    // ---- Lineage ----

    /// Create `new_name` seeded with a copy of this branch's current tree.
    ///
    /// Only the snapshot is copied; the new branch's history starts at its
    /// own patch 1. If `new_name` already exists it is returned unchanged.
    pub async fn branch(&self, new_name: &str) -> BranchResult<Arc<Branch>> {
        if new_name == self.name {
            return Err(BranchError::SelfBranch(self.name.clone()));
        }

        let (project_id, tree) = match &*self.lock().await? {
            Slot::Active(state) if !state.project_id.is_empty() => {
                (state.project_id.clone(), state.tree.clone())
            }
            _ => return Err(BranchError::MissingProject(self.name.clone())),
        };

        let target = self.namespace()?.branch(new_name);
        target
            .initialize(NewBranch {
                project_id,
                branch_name: Some(new_name.to_string()),
                initial_tree: Some(tree),
                origin: Some(self.name.clone()),
            })
            .await?;
        info!(source = %self.name, target = new_name, "branch forked");
        Ok(target)
    }

    pub async fn get_origin(&self) -> BranchResult<Option<String>> {
        let slot = self.lock().await?;
        let origin = self.active(&slot)?.origin.clone();
        Ok(origin)
    }

    /// Replace the recorded origin. Persists the state; writes no patch.
    pub async fn set_origin(&self, origin: Option<String>) -> BranchResult<()> {
        let mut slot = self.lock().await?;
        let Slot::Active(state) = &mut *slot else {
            return Err(BranchError::NotInitialized(self.name.clone()));
        };

        let previous = std::mem::replace(&mut state.origin, origin);
        if let Err(e) = self.storage.save_state(state).await {
            state.origin = previous;
            return Err(e);
        }
        Ok(())
    }

    // ---- Diff & merge ----

    /// What this branch must apply to become `other`.
    pub async fn diff(&self, other: &str) -> BranchResult<Vec<DiffEntry>> {
        let local = {
            let slot = self.lock().await?;
            let tree = self.active(&slot)?.tree.clone();
            tree
        };
        let remote = self.sibling_tree(other).await?;
        Ok(diff_trees(&local, &remote))
    }

    /// Bring `other`'s changes into this branch as one patch.
    ///
    /// Incoming entries keep their source timestamps. Under
    /// [`MergeStrategy::LastWriteWins`] every path present on both sides is
    /// decided by `mtime` and reported as a conflict; writes carry the local
    /// `ctime` they were planned against and are re-resolved if a concurrent
    /// local write moved it.
    pub async fn merge(&self, other: &str, strategy: MergeStrategy) -> BranchResult<MergeResult> {
        let source = self.sibling_tree(other).await?;

        let mut slot = self.lock().await?;
        let current = &self.active(&slot)?.tree;
        let plan = plan_merge(&diff_trees(current, &source), current, strategy);
        let writes = plan
            .writes
            .into_iter()
            .map(|write| StagedWrite {
                path: write.path,
                entry: write.metadata.map(StagedEntry::from),
                expected_ctime: write.expected_ctime,
            })
            .collect();

        let now = self.clock.tick();
        let staged = stage_writes(
            current,
            writes,
            strategy == MergeStrategy::LastWriteWins,
            now,
        )?;

        let mut result = MergeResult {
            success: true,
            conflicts: plan.conflicts,
            ..MergeResult::default()
        };
        result.conflicts.extend(staged.conflicts.iter().cloned());
        for path in staged.added.keys() {
            if plan.existed_locally.get(path).copied().unwrap_or(false) {
                result.modified.push(path.clone());
            } else {
                result.added.push(path.clone());
            }
        }
        result.deleted = staged.deleted.clone();
        result.files_merged = staged.applied().len();

        if result.files_merged > 0 {
            let mut metadata = tagged("merge");
            metadata.insert("source".into(), json!(other));
            metadata.insert("strategy".into(), json!(strategy));
            metadata.insert("conflicts".into(), json!(result.conflicts.len()));
            let patch = self
                .commit(&mut slot, now, staged.added, staged.deleted, metadata)
                .await?;
            result.patch_id = Some(patch.id);
        }

        info!(
            branch = %self.name,
            source = other,
            %strategy,
            merged = result.files_merged,
            conflicts = result.conflicts.len(),
            "merge complete"
        );
        Ok(result)
    }

    // ---- Watch ----

    /// Subscribe to this branch's changes.
    ///
    /// With `from_ctime`, every logged event newer than it is queued ahead of
    /// live events. The backlog is built under the branch lock, so no patch
    /// can slip between catch-up and the live stream.
    pub async fn watch(&self, options: WatchOptions) -> BranchResult<Subscription> {
        let _slot = self.lock().await?;
        let backlog = if options.from_ctime.is_some() {
            replay_events(&self.storage.read_patches(&self.name, 0).await?, &options)
        } else {
            Vec::new()
        };
        debug!(branch = %self.name, backlog = backlog.len(), "watch opened");
        Ok(self.notifier.subscribe(options, backlog))
    }

    /// Number of live watchers.
    pub fn watcher_count(&self) -> usize {
        self.notifier.subscriber_count()
    }

    // ---- Internals ----

    async fn lock(&self) -> BranchResult<MutexGuard<'_, Slot>> {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Unloaded) {
            *slot = self.recover().await?;
        }
        Ok(slot)
    }

    /// Load the last snapshot and fold any logged patches past its `seq`.
    async fn recover(&self) -> BranchResult<Slot> {
        let Some(mut state) = self.storage.load_state(&self.name).await? else {
            return Ok(Slot::Uninitialized);
        };

        let tail = self.storage.read_patches(&self.name, state.seq).await?;
        for patch in &tail {
            if patch.id != state.seq + 1 {
                return Err(BranchError::Corrupt(format!(
                    "gap in patch log of {}: expected patch {}, found {}",
                    self.name,
                    state.seq + 1,
                    patch.id
                )));
            }
            state.tree = apply_patch(&state.tree, patch);
            state.seq = patch.id;
            state.timestamp = patch.timestamp;
        }
        if !tail.is_empty() {
            self.storage.save_state(&state).await?;
            info!(
                branch = %self.name,
                replayed = tail.len(),
                seq = state.seq,
                "recovered patch log tail"
            );
        }

        self.clock.observe(state.timestamp);
        if let Some(latest) = state.tree.iter().map(|(_, f)| f.ctime.max(f.mtime)).max() {
            self.clock.observe(latest);
        }
        Ok(Slot::Active(state))
    }

    async fn commit(
        &self,
        slot: &mut Slot,
        timestamp: u64,
        added: BTreeMap<String, FileMetadata>,
        deleted: Vec<String>,
        metadata: UserMetadata,
    ) -> BranchResult<TreePatch> {
        let Slot::Active(state) = &mut *slot else {
            return Err(BranchError::NotInitialized(self.name.clone()));
        };

        let patch = TreePatch {
            id: state.seq + 1,
            timestamp,
            added,
            deleted,
            metadata: Some(metadata),
        };
        let events = ChangeEvent::from_patch(&state.tree, &patch);
        let next = BranchState {
            origin: state.origin.clone(),
            tree: apply_patch(&state.tree, &patch),
            seq: patch.id,
            project_id: state.project_id.clone(),
            name: state.name.clone(),
            timestamp,
        };

        if let Err(e) = self.persist(&patch, &next).await {
            warn!(
                branch = %self.name,
                patch_id = patch.id,
                error = %e,
                "commit failed; state will be reloaded from storage"
            );
            *slot = Slot::Unloaded;
            return Err(e);
        }
        *slot = Slot::Active(next);

        if let Some(latest) = patch.added.values().map(|f| f.ctime.max(f.mtime)).max() {
            self.clock.observe(latest);
        }
        debug!(
            branch = %self.name,
            patch_id = patch.id,
            kind = patch.kind().unwrap_or("-"),
            added = patch.added.len(),
            deleted = patch.deleted.len(),
            "patch committed"
        );
        self.notifier.publish(&events);
        Ok(patch)
    }

    async fn persist(&self, patch: &TreePatch, next: &BranchState) -> BranchResult<()> {
        self.storage.append_patch(&self.name, patch).await?;
        self.storage.save_state(next).await
    }

    fn active<'a>(&self, slot: &'a Slot) -> BranchResult<&'a BranchState> {
        match slot {
            Slot::Active(state) => Ok(state),
            _ => Err(BranchError::NotInitialized(self.name.clone())),
        }
    }

    /// The project blob store this branch writes to.
    async fn blob_store(&self) -> BranchResult<Arc<dyn BlobStore>> {
        match &*self.lock().await? {
            Slot::Active(state) if !state.project_id.is_empty() => {
                Ok(self.blobs.for_project(&state.project_id))
            }
            _ => Err(BranchError::MissingProject(self.name.clone())),
        }
    }

    fn namespace(&self) -> BranchResult<Arc<NamespaceShared>> {
        self.namespace.upgrade().ok_or(BranchError::NamespaceClosed)
    }

    /// Current tree of another branch in the same namespace.
    async fn sibling_tree(&self, other: &str) -> BranchResult<Tree> {
        let branch = self
            .namespace()?
            .existing(other)
            .await?
            .ok_or_else(|| BranchError::BranchNotFound(other.to_string()))?;
        let slot = branch.lock().await?;
        match &*slot {
            Slot::Active(state) => Ok(state.tree.clone()),
            _ => Err(BranchError::BranchNotFound(other.to_string())),
        }
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name)
            .field("clock", &self.clock)
            .field("notifier", &self.notifier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use arbor_tree::{fold_patches, Resolution};
    use arbor_types::ChangeKind;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::file::FileBranchStorage;
    use crate::namespace::BranchNamespace;
    use crate::storage::InMemoryBranchStorage;
    use crate::{EngineConfig, FilePatch};

    async fn main_branch(ns: &BranchNamespace) -> Arc<Branch> {
        ns.open(NewBranch::new("proj").named("main")).await.unwrap()
    }

    fn bytes(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    async fn assert_log_folds_to_tree(branch: &Branch) {
        let patches = branch.patches().await.unwrap();
        let ids: Vec<u64> = patches.iter().map(|p| p.id).collect();
        let expected: Vec<u64> = (1..=patches.len() as u64).collect();
        assert_eq!(ids, expected, "patch ids must be gapless from 1");
        assert_eq!(branch.seq().await.unwrap(), patches.len() as u64);
        assert_eq!(fold_patches(&patches), branch.tree().await.unwrap());
    }

    // --- Lifecycle ---

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let ns = BranchNamespace::in_memory();
        let branch = main_branch(&ns).await;
        branch.write_file("/a", bytes("x"), None).await.unwrap();

        let mut reseed = Tree::new();
        reseed.insert("/other", branch.get_file_metadata("/a").await.unwrap().unwrap());
        ns.open(NewBranch::new("different").named("main").with_tree(reseed))
            .await
            .unwrap();

        let state = branch.state().await.unwrap().unwrap();
        assert_eq!(state.project_id, "proj");
        assert_eq!(state.seq, 1);
        assert!(!branch.has_file("/other").await.unwrap());
    }

    #[tokio::test]
    async fn initial_tree_becomes_patch_one() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let file = main.write_file("/seed", bytes("s"), None).await.unwrap();

        let mut tree = Tree::new();
        tree.insert("/seed", file.clone());
        let copy = ns
            .open(NewBranch::new("proj").named("copy").with_tree(tree))
            .await
            .unwrap();

        let patches = copy.patches().await.unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].kind(), Some("init"));
        assert_eq!(copy.get_file_metadata("/seed").await.unwrap(), Some(file));
    }

    #[tokio::test]
    async fn uninitialized_branch_reads_empty_and_refuses_writes() {
        let ns = BranchNamespace::in_memory();
        let ghost = ns.get("ghost");

        assert!(!ghost.is_initialized().await.unwrap());
        assert_eq!(ghost.seq().await.unwrap(), 0);
        assert!(ghost.list_files(None).await.unwrap().is_empty());
        assert!(!ghost.delete_file("/a").await.unwrap());

        let err = ghost.write_file("/a", bytes("x"), None).await.unwrap_err();
        assert!(matches!(err, BranchError::MissingProject(_)));
        let err = ghost.soft_delete().await.unwrap_err();
        assert!(matches!(err, BranchError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn empty_project_id_is_rejected() {
        let ns = BranchNamespace::in_memory();
        let err = ns.open(NewBranch::new("").named("main")).await.unwrap_err();
        assert!(matches!(err, BranchError::MissingProject(_)));
    }

    #[tokio::test]
    async fn mismatched_request_name_is_rejected() {
        let ns = BranchNamespace::in_memory();
        let err = ns
            .get("main")
            .initialize(NewBranch::new("p").named("other"))
            .await
            .unwrap_err();
        assert!(matches!(err, BranchError::NameMismatch { .. }));
    }

    // --- Reads and writes ---

    #[tokio::test]
    async fn rewrite_bumps_seq_and_mtime() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;

        let first = main.write_file("/a.txt", bytes("x"), None).await.unwrap();
        let snapshot = main.branch("snapshot").await.unwrap();
        let second = main.write_file("/a.txt", bytes("y"), None).await.unwrap();

        assert_eq!(main.seq().await.unwrap(), 2);
        assert!(second.mtime > first.mtime);

        let diff = snapshot.diff("main").await.unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path, "/a.txt");
        assert_eq!(diff[0].metadata.as_ref(), Some(&second));
    }

    #[tokio::test]
    async fn get_file_returns_content() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let file = main.write_file("/doc", bytes("hello"), None).await.unwrap();

        assert_eq!(file.size_in_bytes, 5);
        assert_eq!(file.address.store_id(), "proj");
        assert_eq!(main.get_file("/doc").await.unwrap(), Some(bytes("hello")));
        assert_eq!(main.get_file("/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn metadata_only_write_keeps_mtime() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let first = main.write_file("/a", bytes("same"), None).await.unwrap();

        let mut tags = UserMetadata::new();
        tags.insert("owner".into(), json!("ops"));
        let second = main.write_file("/a", bytes("same"), Some(tags)).await.unwrap();

        assert_eq!(second.mtime, first.mtime);
        assert!(second.ctime > first.ctime);
        assert_eq!(second.metadata["owner"], "ops");
    }

    #[tokio::test]
    async fn list_files_by_prefix() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        for path in ["/cfg/a", "/cfg/b", "/readme"] {
            main.write_file(path, bytes("x"), None).await.unwrap();
        }

        let cfg: Vec<_> = main
            .list_files(Some("/cfg/"))
            .await
            .unwrap()
            .paths()
            .cloned()
            .collect();
        assert_eq!(cfg, vec!["/cfg/a", "/cfg/b"]);
        assert_eq!(main.list_files(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_absent_path_writes_nothing() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/a", bytes("x"), None).await.unwrap();

        assert!(!main.delete_file("/nope").await.unwrap());
        assert_eq!(main.seq().await.unwrap(), 1);

        assert!(main.delete_file("/a").await.unwrap());
        assert_eq!(main.seq().await.unwrap(), 2);
        assert!(!main.has_file("/a").await.unwrap());
        assert_log_folds_to_tree(&main).await;
    }

    // --- Transactions ---

    #[tokio::test]
    async fn transaction_commits_one_patch() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/old", bytes("o"), None).await.unwrap();

        let result = main
            .transactional_write(
                vec![
                    FilePatch::write("/a", "1"),
                    FilePatch::write("/b", "2"),
                    FilePatch::delete("/old"),
                ],
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.patch_id, Some(2));
        assert!(result.results.values().all(|r| r.success));
        assert!(result.results["/a"].address.is_some());

        let patches = main.patches().await.unwrap();
        let last = patches.last().unwrap();
        assert_eq!(last.kind(), Some("transaction"));
        assert_eq!(last.added.len(), 2);
        assert_eq!(last.deleted, vec!["/old".to_string()]);
        let a = main.get_file_metadata("/a").await.unwrap().unwrap();
        let b = main.get_file_metadata("/b").await.unwrap().unwrap();
        assert_eq!(a.ctime, b.ctime);
        assert_eq!(a.ctime, last.timestamp);
    }

    #[tokio::test]
    async fn strict_conflict_changes_nothing() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let current = main.write_file("/a", bytes("orig"), None).await.unwrap();

        let err = main
            .transactional_write(
                vec![
                    FilePatch::write("/b", "new"),
                    FilePatch::write("/a", "1").expecting_ctime(current.ctime - 1),
                ],
                false,
            )
            .await
            .unwrap_err();

        match err {
            BranchError::Conflict { path, actual, .. } => {
                assert_eq!(path, "/a");
                assert_eq!(actual, Some(current.ctime));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(main.seq().await.unwrap(), 1);
        assert!(!main.has_file("/b").await.unwrap());
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("orig")));
    }

    #[tokio::test]
    async fn forced_conflict_resolved_by_mtime() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.transactional_write(vec![FilePatch::write("/a", "local").with_mtime(5)], false)
            .await
            .unwrap();
        let local = main.get_file_metadata("/a").await.unwrap().unwrap();
        assert_eq!(local.mtime, 5);

        let result = main
            .transactional_write(
                vec![FilePatch::write("/a", "remote")
                    .expecting_ctime(100)
                    .with_mtime(10)],
                true,
            )
            .await
            .unwrap();

        let outcome = &result.results["/a"];
        assert!(outcome.success);
        let conflict = outcome.conflict.as_ref().unwrap();
        assert_eq!(conflict.resolved, Resolution::Remote);
        assert_eq!(conflict.actual_ctime, Some(local.ctime));
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("remote")));

        // An older incoming version loses and leaves the branch untouched.
        let seq = main.seq().await.unwrap();
        let result = main
            .transactional_write(
                vec![FilePatch::write("/a", "stale").expecting_ctime(1).with_mtime(7)],
                true,
            )
            .await
            .unwrap();
        let outcome = &result.results["/a"];
        assert!(!outcome.success);
        assert_eq!(outcome.conflict.as_ref().unwrap().resolved, Resolution::Local);
        assert_eq!(result.patch_id, None);
        assert_eq!(main.seq().await.unwrap(), seq);
    }

    #[tokio::test]
    async fn noop_transaction_commits_nothing() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let result = main
            .transactional_write(vec![FilePatch::delete("/absent")], false)
            .await
            .unwrap();
        assert_eq!(result.patch_id, None);
        assert_eq!(main.seq().await.unwrap(), 0);
    }

    // --- Lineage ---

    #[tokio::test]
    async fn fork_then_delete_shows_as_add_in_diff() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/shared", bytes("s"), None).await.unwrap();

        let feature = main.branch("feature").await.unwrap();
        assert_eq!(feature.get_origin().await.unwrap().as_deref(), Some("main"));
        assert!(feature.delete_file("/shared").await.unwrap());

        let diff = feature.diff("main").await.unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path, "/shared");
        assert!(!diff[0].is_deletion());

        let reverse = main.diff("feature").await.unwrap();
        assert!(reverse[0].is_deletion());
    }

    #[tokio::test]
    async fn fork_copies_snapshot_not_history() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        for i in 0..5 {
            main.write_file("/f", Bytes::from(format!("v{i}")), None)
                .await
                .unwrap();
        }
        let fork = main.branch("fork").await.unwrap();
        assert_eq!(fork.seq().await.unwrap(), 1);
        assert_eq!(fork.tree().await.unwrap(), main.tree().await.unwrap());
    }

    #[tokio::test]
    async fn branch_preconditions() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        assert!(matches!(
            main.branch("main").await.unwrap_err(),
            BranchError::SelfBranch(_)
        ));
        assert!(matches!(
            ns.get("ghost").branch("child").await.unwrap_err(),
            BranchError::MissingProject(_)
        ));
        assert!(matches!(
            main.diff("ghost").await.unwrap_err(),
            BranchError::BranchNotFound(_)
        ));
    }

    #[tokio::test]
    async fn unknown_sibling_leaves_no_handle() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        for i in 0..5 {
            let name = format!("ghost-{i}");
            assert!(matches!(
                main.diff(&name).await.unwrap_err(),
                BranchError::BranchNotFound(_)
            ));
            assert!(matches!(
                main.merge(&name, MergeStrategy::Override).await.unwrap_err(),
                BranchError::BranchNotFound(_)
            ));
        }
        assert_eq!(ns.handle_count(), 1);
    }

    #[tokio::test]
    async fn set_origin_persists_without_patch() {
        let storage = Arc::new(InMemoryBranchStorage::new());
        let ns = BranchNamespace::new(
            storage.clone(),
            Arc::new(BlobStores::in_memory()),
            EngineConfig::default(),
        );
        let main = main_branch(&ns).await;
        main.set_origin(Some("upstream".into())).await.unwrap();

        assert_eq!(main.get_origin().await.unwrap().as_deref(), Some("upstream"));
        assert_eq!(main.seq().await.unwrap(), 0);
        let saved = storage.load_state("main").await.unwrap().unwrap();
        assert_eq!(saved.origin.as_deref(), Some("upstream"));
    }

    #[tokio::test]
    async fn soft_delete_empties_tree_keeps_identity() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let feature = main.branch("feature").await.unwrap();
        for path in ["/a", "/b", "/c"] {
            feature.write_file(path, bytes("x"), None).await.unwrap();
        }
        let seq = feature.seq().await.unwrap();

        assert_eq!(feature.soft_delete().await.unwrap(), 3);
        assert!(feature.list_files(None).await.unwrap().is_empty());
        assert_eq!(feature.get_origin().await.unwrap().as_deref(), Some("main"));
        assert_eq!(feature.seq().await.unwrap(), seq + 1);
        assert_eq!(
            feature.patches().await.unwrap().last().unwrap().kind(),
            Some("softDelete")
        );

        assert_eq!(feature.soft_delete().await.unwrap(), 0);
        assert_eq!(feature.seq().await.unwrap(), seq + 1);
        assert_log_folds_to_tree(&feature).await;
    }

    // --- Merge ---

    #[tokio::test]
    async fn override_merge_classifies_changes() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/keep", bytes("k"), None).await.unwrap();
        main.write_file("/old", bytes("o"), None).await.unwrap();
        main.write_file("/edit", bytes("e1"), None).await.unwrap();

        let feature = main.branch("feature").await.unwrap();
        feature.write_file("/new", bytes("n"), None).await.unwrap();
        feature.delete_file("/old").await.unwrap();
        let edited = feature.write_file("/edit", bytes("e2"), None).await.unwrap();

        let result = main.merge("feature", MergeStrategy::Override).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_merged, 3);
        assert_eq!(result.added, vec!["/new"]);
        assert_eq!(result.modified, vec!["/edit"]);
        assert_eq!(result.deleted, vec!["/old"]);
        assert!(result.conflicts.is_empty());

        // Source timestamps survive the merge.
        let merged = main.get_file_metadata("/edit").await.unwrap().unwrap();
        assert_eq!(merged.mtime, edited.mtime);
        assert!(main.diff("feature").await.unwrap().is_empty());

        let patch = main.patches().await.unwrap().pop().unwrap();
        assert_eq!(patch.kind(), Some("merge"));
        let tags = patch.metadata.unwrap();
        assert_eq!(tags["source"], "feature");
        assert_eq!(tags["strategy"], "OVERRIDE");
        assert_log_folds_to_tree(&main).await;
    }

    #[tokio::test]
    async fn override_merge_advances_ctime_past_newer_local() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/a", bytes("base"), None).await.unwrap();

        let feature = main.branch("feature").await.unwrap();
        let incoming = feature.write_file("/a", bytes("feature"), None).await.unwrap();
        let local = main.write_file("/a", bytes("main"), None).await.unwrap();
        assert!(local.ctime >= incoming.ctime);

        main.merge("feature", MergeStrategy::Override).await.unwrap();
        let merged = main.get_file_metadata("/a").await.unwrap().unwrap();
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("feature")));
        assert_eq!(merged.mtime, incoming.mtime);
        assert!(merged.ctime > local.ctime);

        // A writer holding the pre-merge ctime must see the merge.
        let err = main
            .transactional_write(
                vec![FilePatch::write("/a", "stale").expecting_ctime(local.ctime)],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BranchError::Conflict { .. }));
        assert_log_folds_to_tree(&main).await;
    }

    /// Write `content` at `path` with an explicit `mtime`.
    async fn write_at(branch: &Branch, path: &str, content: &'static str, mtime: u64) {
        branch
            .transactional_write(vec![FilePatch::write(path, content).with_mtime(mtime)], false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lww_merge_keeps_newer_local() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        write_at(&main, "/a", "base", 100).await;
        let feature = main.branch("feature").await.unwrap();

        write_at(&feature, "/a", "feature", 1_000).await;
        write_at(&main, "/a", "main", 2_000).await;
        let seq = main.seq().await.unwrap();

        let result = main
            .merge("feature", MergeStrategy::LastWriteWins)
            .await
            .unwrap();
        assert_eq!(result.files_merged, 0);
        assert_eq!(result.patch_id, None);
        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.resolved, Resolution::Local);
        assert_eq!(conflict.local_mtime, Some(2_000));
        assert_eq!(conflict.incoming_mtime, Some(1_000));
        assert_eq!(main.seq().await.unwrap(), seq);
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("main")));
    }

    #[tokio::test]
    async fn lww_merge_takes_newer_remote() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        write_at(&main, "/a", "base", 100).await;
        let feature = main.branch("feature").await.unwrap();

        write_at(&main, "/a", "main", 1_000).await;
        write_at(&feature, "/a", "feature", 2_000).await;
        feature.write_file("/extra", bytes("x"), None).await.unwrap();

        let result = main
            .merge("feature", MergeStrategy::LastWriteWins)
            .await
            .unwrap();
        assert_eq!(result.modified, vec!["/a"]);
        assert_eq!(result.added, vec!["/extra"]);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].resolved, Resolution::Remote);
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("feature")));
        assert_eq!(
            main.get_file_metadata("/a").await.unwrap().unwrap().mtime,
            2_000
        );
    }

    #[tokio::test]
    async fn merge_with_nothing_to_do() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/a", bytes("a"), None).await.unwrap();
        main.branch("copy").await.unwrap();

        let result = main.merge("copy", MergeStrategy::Override).await.unwrap();
        assert!(result.success);
        assert_eq!(result.files_merged, 0);
        assert_eq!(main.seq().await.unwrap(), 1);
    }

    // --- Watch ---

    #[tokio::test]
    async fn live_events_per_path() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let mut sub = main.watch(WatchOptions::default()).await.unwrap();

        main.write_file("/a", bytes("1"), None).await.unwrap();
        main.write_file("/a", bytes("2"), None).await.unwrap();
        main.delete_file("/a").await.unwrap();

        let kinds: Vec<_> = (0..3)
            .map(|_| sub.try_recv().unwrap())
            .map(|e| (e.kind, e.patch_id))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Added, 1),
                (ChangeKind::Modified, 2),
                (ChangeKind::Deleted, 3),
            ]
        );
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn catch_up_then_live_without_gap() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        main.write_file("/one", bytes("1"), None).await.unwrap();
        let from = main.patches().await.unwrap()[0].timestamp;
        main.write_file("/two", bytes("2"), None).await.unwrap();
        main.write_file("/cfg/three", bytes("3"), None).await.unwrap();

        let mut all = main
            .watch(WatchOptions {
                from_ctime: Some(from),
                path_filter: None,
            })
            .await
            .unwrap();
        let mut cfg = main
            .watch(WatchOptions {
                from_ctime: Some(0),
                path_filter: Some("/cfg/".into()),
            })
            .await
            .unwrap();
        main.write_file("/cfg/four", bytes("4"), None).await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = all.try_recv() {
            seen.push(event.patch_id);
        }
        assert_eq!(seen, vec![2, 3, 4]);

        let mut cfg_paths = Vec::new();
        while let Some(event) = cfg.try_recv() {
            cfg_paths.push(event.path);
        }
        assert_eq!(cfg_paths, vec!["/cfg/three", "/cfg/four"]);
    }

    #[tokio::test]
    async fn cancelled_watch_is_removed() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;
        let sub = main.watch(WatchOptions::default()).await.unwrap();
        assert_eq!(main.watcher_count(), 1);
        drop(sub);
        assert_eq!(main.watcher_count(), 0);
        main.write_file("/a", bytes("x"), None).await.unwrap();
    }

    // --- Concurrency ---

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_get_gapless_ids() {
        let ns = BranchNamespace::in_memory();
        let main = main_branch(&ns).await;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..32 {
            let main = Arc::clone(&main);
            tasks.spawn(async move {
                main.write_file(&format!("/f{}", i % 8), Bytes::from(format!("v{i}")), None)
                    .await
                    .unwrap();
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        assert_eq!(main.seq().await.unwrap(), 32);
        let patches = main.patches().await.unwrap();
        assert!(patches.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
        assert_log_folds_to_tree(&main).await;
    }

    // --- Persistence ---

    #[tokio::test]
    async fn file_storage_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let open_namespace = || {
            BranchNamespace::new(
                Arc::new(FileBranchStorage::new(dir.path().join("branches"))),
                Arc::new(BlobStores::new(arbor_blob::BlobBackend::Filesystem {
                    root: dir.path().join("blobs"),
                })),
                EngineConfig::default(),
            )
        };

        let last_ctime = {
            let ns = open_namespace();
            let main = main_branch(&ns).await;
            main.write_file("/a", bytes("persisted"), None).await.unwrap();
            main.branch("feature").await.unwrap();
            main.write_file("/b", bytes("b"), None).await.unwrap().ctime
        };

        let ns = open_namespace();
        let main = ns.get("main");
        assert_eq!(main.seq().await.unwrap(), 2);
        assert_eq!(main.get_file("/a").await.unwrap(), Some(bytes("persisted")));
        assert_eq!(
            ns.get("feature").get_origin().await.unwrap().as_deref(),
            Some("main")
        );

        let next = main.write_file("/c", bytes("c"), None).await.unwrap();
        assert!(next.ctime > last_ctime);
        assert_log_folds_to_tree(&main).await;
    }

    #[tokio::test]
    async fn torn_log_tail_does_not_hide_later_patches() {
        let dir = tempfile::tempdir().unwrap();
        let branches = dir.path().join("branches");
        let open_namespace = || {
            BranchNamespace::new(
                Arc::new(FileBranchStorage::new(&branches)),
                Arc::new(BlobStores::new(arbor_blob::BlobBackend::Filesystem {
                    root: dir.path().join("blobs"),
                })),
                EngineConfig::default(),
            )
        };

        {
            let ns = open_namespace();
            main_branch(&ns).await.write_file("/a", bytes("a"), None).await.unwrap();
        }

        // A crash mid-append leaves half a frame at the end of the log.
        let log = branches.join(hex::encode("main")).join(crate::file::PATCH_LOG);
        let torn = crate::file::encode_frame(&TreePatch {
            id: 2,
            timestamp: 0,
            added: BTreeMap::new(),
            deleted: vec!["/a".into()],
            metadata: None,
        })
        .unwrap();
        let mut data = std::fs::read(&log).unwrap();
        data.extend_from_slice(&torn[..torn.len() / 2]);
        std::fs::write(&log, &data).unwrap();

        let last_timestamp = {
            let ns = open_namespace();
            let main = ns.get("main");
            main.write_file("/b", bytes("b"), None).await.unwrap();
            main.write_file("/c", bytes("c"), None).await.unwrap();
            assert_log_folds_to_tree(&main).await;
            main.state().await.unwrap().unwrap().timestamp
        };

        // Patch 4 reaches the log but the snapshot save never happens.
        FileBranchStorage::new(&branches)
            .append_patch(
                "main",
                &TreePatch {
                    id: 4,
                    timestamp: last_timestamp + 1,
                    added: BTreeMap::new(),
                    deleted: vec!["/a".into()],
                    metadata: None,
                },
            )
            .await
            .unwrap();

        let ns = open_namespace();
        let main = ns.get("main");
        assert_eq!(main.seq().await.unwrap(), 4);
        assert!(!main.has_file("/a").await.unwrap());
        assert_eq!(main.tree().await.unwrap().paths().collect::<Vec<_>>(), ["/b", "/c"]);
        assert_log_folds_to_tree(&main).await;
    }

    /// Fails the next `save_state` after a patch has been appended.
    struct FlakyStorage {
        inner: InMemoryBranchStorage,
        fail_next_save: AtomicBool,
    }

    #[async_trait]
    impl BranchStorage for FlakyStorage {
        async fn load_state(&self, branch: &str) -> BranchResult<Option<BranchState>> {
            self.inner.load_state(branch).await
        }

        async fn save_state(&self, state: &BranchState) -> BranchResult<()> {
            if self.fail_next_save.swap(false, Ordering::SeqCst) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.save_state(state).await
        }

        async fn append_patch(&self, branch: &str, patch: &TreePatch) -> BranchResult<()> {
            self.inner.append_patch(branch, patch).await
        }

        async fn read_patches(&self, branch: &str, after_seq: u64) -> BranchResult<Vec<TreePatch>> {
            self.inner.read_patches(branch, after_seq).await
        }
    }

    #[tokio::test]
    async fn failed_snapshot_save_recovers_from_log() {
        let storage = Arc::new(FlakyStorage {
            inner: InMemoryBranchStorage::new(),
            fail_next_save: AtomicBool::new(false),
        });
        let ns = BranchNamespace::new(
            storage.clone(),
            Arc::new(BlobStores::in_memory()),
            EngineConfig::default(),
        );
        let main = main_branch(&ns).await;
        main.write_file("/a", bytes("1"), None).await.unwrap();

        storage.fail_next_save.store(true, Ordering::SeqCst);
        let err = main.write_file("/b", bytes("2"), None).await.unwrap_err();
        assert!(matches!(err, BranchError::Io(_)));

        // The appended patch is durable, so the next access replays it.
        assert_eq!(main.seq().await.unwrap(), 2);
        assert!(main.has_file("/b").await.unwrap());
        main.write_file("/c", bytes("3"), None).await.unwrap();
        assert_log_folds_to_tree(&main).await;
        assert_eq!(storage.inner.load_state("main").await.unwrap().unwrap().seq, 3);
    }
}
