//! Folding patches into trees.

use arbor_types::{ChangeKind, FileMetadata, Tree, TreePatch};

/// A single path affected by a patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathChange {
    pub kind: ChangeKind,
    pub path: String,
    /// New entry for added/modified paths, `None` for deletions.
    pub metadata: Option<FileMetadata>,
}

/// Apply `patch` to `tree`, returning the new tree.
///
/// `added` entries are upserted first, then `deleted` paths are removed.
/// Deleting an absent path is a no-op.
pub fn apply_patch(tree: &Tree, patch: &TreePatch) -> Tree {
    let mut next = tree.clone();
    for (path, file) in &patch.added {
        next.insert(path.clone(), file.clone());
    }
    for path in &patch.deleted {
        next.remove(path);
    }
    next
}

/// Fold patches in order starting from an empty tree.
pub fn fold_patches<'a>(patches: impl IntoIterator<Item = &'a TreePatch>) -> Tree {
    patches
        .into_iter()
        .fold(Tree::new(), |tree, patch| apply_patch(&tree, patch))
}

/// Describe what applying `patch` to `prev` changes, one entry per path.
///
/// Upserts of paths present in `prev` are `Modified`, otherwise `Added`.
/// Deletions are reported only for paths that actually existed. Output is in
/// path order for additions/modifications, followed by deletions in patch
/// order.
pub fn classify_patch(prev: &Tree, patch: &TreePatch) -> Vec<PathChange> {
    let mut changes = Vec::with_capacity(patch.added.len() + patch.deleted.len());

    for (path, file) in &patch.added {
        if patch.deleted.contains(path) {
            continue;
        }
        let kind = if prev.contains(path) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        changes.push(PathChange {
            kind,
            path: path.clone(),
            metadata: Some(file.clone()),
        });
    }

    for path in &patch.deleted {
        if prev.contains(path) {
            changes.push(PathChange {
                kind: ChangeKind::Deleted,
                path: path.clone(),
                metadata: None,
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{BlobAddress, BlobHash, UserMetadata};
    use std::collections::BTreeMap;

    fn file(content: &[u8], ts: u64) -> FileMetadata {
        FileMetadata {
            address: BlobAddress::new("p", BlobHash::of(content)),
            metadata: UserMetadata::new(),
            size_in_bytes: content.len() as u64,
            mtime: ts,
            ctime: ts,
        }
    }

    fn patch(id: u64, added: &[(&str, &[u8])], deleted: &[&str]) -> TreePatch {
        TreePatch {
            id,
            timestamp: id * 10,
            added: added
                .iter()
                .map(|(p, c)| (p.to_string(), file(c, id * 10)))
                .collect::<BTreeMap<_, _>>(),
            deleted: deleted.iter().map(|p| p.to_string()).collect(),
            metadata: None,
        }
    }

    #[test]
    fn apply_upserts_and_deletes() {
        let tree = apply_patch(&Tree::new(), &patch(1, &[("/a", b"1"), ("/b", b"2")], &[]));
        assert_eq!(tree.len(), 2);

        let next = apply_patch(&tree, &patch(2, &[("/a", b"changed")], &["/b"]));
        assert_eq!(next.len(), 1);
        assert_eq!(next.get("/a").unwrap().address.hash(), &BlobHash::of(b"changed"));
        // Input untouched.
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn deleting_absent_path_is_noop() {
        let tree = apply_patch(&Tree::new(), &patch(1, &[("/a", b"1")], &[]));
        let next = apply_patch(&tree, &patch(2, &[], &["/missing"]));
        assert_eq!(next, tree);
    }

    #[test]
    fn fold_reproduces_sequential_application() {
        let patches = vec![
            patch(1, &[("/a", b"1"), ("/b", b"2")], &[]),
            patch(2, &[("/c", b"3")], &["/a"]),
            patch(3, &[("/a", b"4")], &[]),
        ];
        let folded = fold_patches(&patches);
        let paths: Vec<_> = folded.paths().cloned().collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
        assert_eq!(folded.get("/a").unwrap().mtime, 30);
    }

    #[test]
    fn classify_distinguishes_added_and_modified() {
        let prev = apply_patch(&Tree::new(), &patch(1, &[("/a", b"1")], &[]));
        let next = patch(2, &[("/a", b"2"), ("/b", b"3")], &["/gone", "/a-missing"]);
        let changes = classify_patch(&prev, &next);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "/a");
        assert_eq!(changes[0].kind, ChangeKind::Modified);
        assert_eq!(changes[1].path, "/b");
        assert_eq!(changes[1].kind, ChangeKind::Added);
    }

    #[test]
    fn classify_reports_existing_deletions() {
        let prev = apply_patch(&Tree::new(), &patch(1, &[("/a", b"1"), ("/b", b"2")], &[]));
        let changes = classify_patch(&prev, &patch(2, &[], &["/b", "/nope"]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert_eq!(changes[0].path, "/b");
        assert!(changes[0].metadata.is_none());
    }
}
