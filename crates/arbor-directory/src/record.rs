use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry in the branch directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// The branch this one was forked from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_branch: Option<String>,
}

impl BranchRecord {
    /// A record created now with no metadata and no origin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            metadata: Map::new(),
            origin_branch: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin_branch = Some(origin.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}
