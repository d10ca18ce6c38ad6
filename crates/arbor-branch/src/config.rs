use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`BranchNamespace`](crate::BranchNamespace).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Live events a watcher may leave unread before it is dropped.
    pub watch_channel_capacity: usize,
    /// Branch name used when a `NewBranch` request names none.
    pub default_branch: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watch_channel_capacity: 1024,
            default_branch: "main".into(),
        }
    }
}
