use serde::{Deserialize, Serialize};

use arbor_tree::{apply_patch, classify_patch};
use arbor_types::{ChangeKind, FileMetadata, Tree, TreePatch};

/// A change to one path, produced by one patch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
    pub timestamp: u64,
    pub patch_id: u64,
}

impl ChangeEvent {
    /// Events for applying `patch` on top of `prev`, one per changed path.
    pub fn from_patch(prev: &Tree, patch: &TreePatch) -> Vec<ChangeEvent> {
        classify_patch(prev, patch)
            .into_iter()
            .map(|change| ChangeEvent {
                kind: change.kind,
                path: change.path,
                metadata: change.metadata,
                timestamp: patch.timestamp,
                patch_id: patch.id,
            })
            .collect()
    }

    /// Render as one server-sent-events frame:
    /// `event: change\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("event: change\ndata: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Final server-sent-events frame of a stream whose subscriber fell behind.
pub const LAGGED_SSE_FRAME: &str = "event: lagged\ndata: {}\n\n";

/// What a subscriber wants to see.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Replay logged events with a patch timestamp strictly greater than this.
    #[serde(default)]
    pub from_ctime: Option<u64>,
    /// Only paths starting with this prefix.
    #[serde(default)]
    pub path_filter: Option<String>,
}

impl WatchOptions {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match &self.path_filter {
            Some(prefix) => event.path.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Rebuild the event history of a patch log for a catch-up subscriber.
///
/// Folds `patches` (in id order, starting from an empty tree) so each event is
/// classified against the tree it was applied to, and keeps the events newer
/// than `options.from_ctime` that pass the path filter. Without `from_ctime`
/// nothing is replayed.
pub fn replay_events(patches: &[TreePatch], options: &WatchOptions) -> Vec<ChangeEvent> {
    let Some(from_ctime) = options.from_ctime else {
        return Vec::new();
    };

    let mut tree = Tree::new();
    let mut events = Vec::new();
    for patch in patches {
        if patch.timestamp > from_ctime {
            events.extend(
                ChangeEvent::from_patch(&tree, patch)
                    .into_iter()
                    .filter(|event| options.matches(event)),
            );
        }
        tree = apply_patch(&tree, patch);
    }
    events
}
